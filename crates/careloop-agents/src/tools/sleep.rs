use async_trait::async_trait;
use careloop_common::{Category, Error, Measurement, Result};
use serde_json::json;

use crate::tools::{save_measurement, update_latest, Tool, ToolContext, ToolDeps, ToolOutput};

fn parse_hours(args: &serde_json::Value) -> Result<f64> {
    let hours = args["hours"]
        .as_f64()
        .ok_or_else(|| Error::Validation("missing or invalid 'hours' argument".to_string()))?;
    if !(0.0..=24.0).contains(&hours) {
        return Err(Error::Validation(
            "hours must be between 0 and 24".to_string(),
        ));
    }
    Ok(hours)
}

// ---------------------------------------------------------------------------
// SaveSleep
// ---------------------------------------------------------------------------

/// Tool for recording how long the patient slept.
pub struct SaveSleep {
    deps: ToolDeps,
}

impl SaveSleep {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for SaveSleep {
    fn name(&self) -> &'static str {
        "save_sleep_hours"
    }

    fn description(&self) -> &'static str {
        "Save how many hours the patient slept last night. Fractional hours \
         are fine (e.g. 6.5)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "hours": {
                    "type": "number",
                    "description": "Hours slept, 0-24"
                },
                "note": {
                    "type": "string",
                    "description": "Optional context, e.g. 'woke up twice'"
                },
                "recorded_at": {
                    "type": "string",
                    "description": "RFC 3339 timestamp. Defaults to now."
                }
            },
            "required": ["hours"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let hours = parse_hours(&args)?;
        save_measurement(
            &self.deps,
            context,
            Measurement::Sleep { hours },
            &args,
            format!("Sleep of {hours} hours saved."),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// UpdateSleep
// ---------------------------------------------------------------------------

/// Tool for correcting the most recent wellness record's sleep value.
pub struct UpdateSleep {
    deps: ToolDeps,
}

impl UpdateSleep {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for UpdateSleep {
    fn name(&self) -> &'static str {
        "update_sleep_hours"
    }

    fn description(&self) -> &'static str {
        "Correct the patient's most recent sleep entry, e.g. when they \
         misspoke. Replaces the value of the latest wellness record."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "hours": {
                    "type": "number",
                    "description": "Corrected hours slept, 0-24"
                },
                "note": {
                    "type": "string",
                    "description": "Optional replacement note"
                }
            },
            "required": ["hours"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let hours = parse_hours(&args)?;
        update_latest(
            &self.deps,
            context,
            Category::Wellness,
            Measurement::Sleep { hours },
            &args,
            format!("Latest sleep entry corrected to {hours} hours."),
        )
        .await
    }
}
