use std::sync::Arc;

use async_trait::async_trait;
use careloop_common::{
    Category, Error, Measurement, MeasurementDraft, OutreachChannel, PatientId, Result,
};
use careloop_db::RecordStore;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::anomaly::PlausibleRanges;

pub mod glucose;
pub mod insulin;
pub mod sleep;
pub mod wellness;

pub use glucose::{SaveGlucose, UpdateGlucose};
pub use insulin::{SaveInsulin, UpdateInsulin};
pub use sleep::{SaveSleep, UpdateSleep};
pub use wellness::{SaveDizziness, SaveStress, UpdateDizziness, UpdateStress};

/// A callable tool exposed to the conversational agent (voice or chat).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema of the tool's arguments.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput>;
}

/// Per-session binding for tool invocations. The patient id is established
/// once when the session opens and is never accepted as a tool argument, so
/// a manipulated conversation cannot write across patients.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub patient_id: PatientId,
    pub conversation_id: String,
    pub channel: OutreachChannel,
}

/// Result of a tool invocation returned to the conversational layer.
///
/// `unusual` is the anomaly flag: the value was persisted, but fell outside
/// plausible bounds, and the agent should ask a follow-up question on its
/// next turn.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    pub unusual: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            unusual: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            unusual: false,
        }
    }

    pub fn flag_unusual(mut self) -> Self {
        self.unusual = true;
        self
    }
}

/// Shared state handed to every measurement tool.
#[derive(Clone)]
pub struct ToolDeps {
    pub records: Arc<Mutex<RecordStore>>,
    pub ranges: Arc<PlausibleRanges>,
}

impl ToolDeps {
    pub fn new(records: Arc<Mutex<RecordStore>>, ranges: PlausibleRanges) -> Self {
        Self {
            records,
            ranges: Arc::new(ranges),
        }
    }
}

pub(crate) fn parse_note(args: &serde_json::Value) -> Option<String> {
    args["note"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Optional `recorded_at` argument, RFC 3339. Defaults to now.
pub(crate) fn parse_recorded_at(args: &serde_json::Value) -> Result<DateTime<Utc>> {
    match args["recorded_at"].as_str() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                Error::Validation(format!(
                    "invalid recorded_at '{raw}', expected RFC 3339: {e}"
                ))
            }),
        None => Ok(Utc::now()),
    }
}

/// Persist a new measurement, applying the anomaly policy: the value is
/// always saved; implausible values are flagged, never rejected.
pub(crate) async fn save_measurement(
    deps: &ToolDeps,
    context: &ToolContext,
    measurement: Measurement,
    args: &serde_json::Value,
    summary: String,
) -> Result<ToolOutput> {
    let unusual = deps.ranges.is_unusual(&measurement);
    let draft = MeasurementDraft::new(context.patient_id.clone(), measurement)
        .with_note(parse_note(args))
        .at(parse_recorded_at(args)?);

    let record_id = deps.records.lock().await.insert_record(&draft, unusual)?;
    info!(
        patient_id = %context.patient_id,
        conversation_id = %context.conversation_id,
        record_id = %record_id,
        unusual,
        "measurement saved"
    );

    let output = ToolOutput::success(summary);
    if unusual {
        Ok(output.flag_unusual())
    } else {
        Ok(output)
    }
}

/// Correct the most recent record of the same measurement kind for the
/// bound patient. The record is resolved here by timestamp and kind, so
/// a sleep correction never rewrites a newer stress or dizziness entry;
/// the conversation never supplies an id. Concurrent corrections are
/// last-write-wins.
pub(crate) async fn update_latest(
    deps: &ToolDeps,
    context: &ToolContext,
    category: Category,
    measurement: Measurement,
    args: &serde_json::Value,
    summary: String,
) -> Result<ToolOutput> {
    let unusual = deps.ranges.is_unusual(&measurement);
    let note = parse_note(args);

    let records = deps.records.lock().await;
    let Some(latest) =
        records.latest_record_of_kind(&context.patient_id, category, measurement.kind_tag())?
    else {
        return Ok(ToolOutput::error(format!(
            "no existing {} record to correct",
            measurement.kind_tag()
        )));
    };
    records.update_record(&latest.id, &measurement, note.as_deref(), unusual)?;
    info!(
        patient_id = %context.patient_id,
        record_id = %latest.id,
        unusual,
        "measurement corrected"
    );

    let output = ToolOutput::success(summary);
    if unusual {
        Ok(output.flag_unusual())
    } else {
        Ok(output)
    }
}
