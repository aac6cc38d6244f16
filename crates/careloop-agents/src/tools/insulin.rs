use async_trait::async_trait;
use careloop_common::{Category, Error, InsulinKind, Measurement, Result};
use serde_json::json;

use crate::tools::{save_measurement, update_latest, Tool, ToolContext, ToolDeps, ToolOutput};

fn parse_units(args: &serde_json::Value) -> Result<f64> {
    let units = args["units"]
        .as_f64()
        .ok_or_else(|| Error::Validation("missing or invalid 'units' argument".to_string()))?;
    if units <= 0.0 {
        return Err(Error::Validation("units must be positive".to_string()));
    }
    Ok(units)
}

fn parse_kind(args: &serde_json::Value) -> Result<Option<InsulinKind>> {
    match args["insulin_type"].as_str() {
        Some(raw) => raw.parse().map(Some),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// SaveInsulin
// ---------------------------------------------------------------------------

/// Tool for recording an administered insulin dose. The insulin type is
/// mandatory: a dose without rapid/basal attribution is clinically
/// meaningless, so the agent must ask rather than guess.
pub struct SaveInsulin {
    deps: ToolDeps,
}

impl SaveInsulin {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for SaveInsulin {
    fn name(&self) -> &'static str {
        "save_insulin_dose"
    }

    fn description(&self) -> &'static str {
        "Save an insulin dose the patient administered, in units. You must \
         specify whether it was rapid-acting or basal insulin; if the patient \
         did not say, ask them before calling this tool."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "units": {
                    "type": "number",
                    "description": "Dose size in insulin units"
                },
                "insulin_type": {
                    "type": "string",
                    "enum": ["rapid", "basal"],
                    "description": "Which insulin was administered"
                },
                "note": {
                    "type": "string",
                    "description": "Optional context, e.g. 'with dinner'"
                },
                "recorded_at": {
                    "type": "string",
                    "description": "RFC 3339 timestamp of the dose. Defaults to now."
                }
            },
            "required": ["units", "insulin_type"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let units = parse_units(&args)?;
        let kind = parse_kind(&args)?.ok_or_else(|| {
            Error::Validation(
                "missing 'insulin_type': ask the patient whether the dose was rapid or basal"
                    .to_string(),
            )
        })?;

        save_measurement(
            &self.deps,
            context,
            Measurement::Insulin { units, kind },
            &args,
            format!("{kind} insulin dose of {units} units saved."),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// UpdateInsulin
// ---------------------------------------------------------------------------

/// Tool for correcting the most recent insulin dose. The type is optional
/// here; when omitted, the dose keeps its original attribution.
pub struct UpdateInsulin {
    deps: ToolDeps,
}

impl UpdateInsulin {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for UpdateInsulin {
    fn name(&self) -> &'static str {
        "update_insulin_dose"
    }

    fn description(&self) -> &'static str {
        "Correct the patient's most recent insulin dose. Replaces the units \
         of the latest dose; pass insulin_type only if that was also wrong."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "units": {
                    "type": "number",
                    "description": "Corrected dose size in insulin units"
                },
                "insulin_type": {
                    "type": "string",
                    "enum": ["rapid", "basal"],
                    "description": "Corrected insulin type. Omit to keep the recorded one."
                },
                "note": {
                    "type": "string",
                    "description": "Optional replacement note"
                }
            },
            "required": ["units"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let units = parse_units(&args)?;
        let requested_kind = parse_kind(&args)?;

        let kind = match requested_kind {
            Some(kind) => kind,
            None => {
                let records = self.deps.records.lock().await;
                match records.latest_record(&context.patient_id, Category::Insulin)? {
                    Some(latest) => match latest.measurement {
                        Measurement::Insulin { kind, .. } => kind,
                        _ => {
                            return Err(Error::Database(format!(
                                "insulin record {} holds a non-insulin payload",
                                latest.id
                            )));
                        }
                    },
                    None => {
                        return Ok(ToolOutput::error(
                            "no existing insulin record to correct".to_string(),
                        ));
                    }
                }
            }
        };

        update_latest(
            &self.deps,
            context,
            Category::Insulin,
            Measurement::Insulin { units, kind },
            &args,
            format!("Latest insulin dose corrected to {units} units ({kind})."),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{test_context, test_deps};
    use careloop_common::PatientId;

    #[tokio::test]
    async fn saves_dose_with_type() {
        let deps = test_deps();
        let tool = SaveInsulin::new(deps.clone());

        let out = tool
            .execute(
                &test_context("p-1"),
                json!({ "units": 8.0, "insulin_type": "rapid" }),
            )
            .await
            .expect("tool execution should succeed");

        assert!(!out.is_error);
        assert!(out.content.contains("rapid"));

        let latest = deps
            .records
            .lock()
            .await
            .latest_record(&PatientId::from("p-1"), Category::Insulin)
            .unwrap()
            .unwrap();
        assert_eq!(
            latest.measurement,
            Measurement::Insulin {
                units: 8.0,
                kind: InsulinKind::Rapid
            }
        );
    }

    #[tokio::test]
    async fn rejects_missing_type() {
        let deps = test_deps();
        let tool = SaveInsulin::new(deps.clone());

        let err = tool
            .execute(&test_context("p-1"), json!({ "units": 8.0 }))
            .await;

        assert!(err.is_err());
        let msg = err.unwrap_err().to_string();
        assert!(msg.contains("insulin_type"));
        assert!(msg.contains("ask the patient"));

        // The rejected dose must leave no trace in the store.
        let latest = deps
            .records
            .lock()
            .await
            .latest_record(&PatientId::from("p-1"), Category::Insulin)
            .unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn rejects_unknown_type() {
        let tool = SaveInsulin::new(test_deps());

        let err = tool
            .execute(
                &test_context("p-1"),
                json!({ "units": 8.0, "insulin_type": "intermediate" }),
            )
            .await;

        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("intermediate"));
    }

    #[tokio::test]
    async fn oversized_dose_is_saved_and_flagged() {
        let deps = test_deps();
        let tool = SaveInsulin::new(deps.clone());

        let out = tool
            .execute(
                &test_context("p-1"),
                json!({ "units": 90.0, "insulin_type": "basal" }),
            )
            .await
            .unwrap();

        assert!(!out.is_error);
        assert!(out.unusual);
    }

    #[tokio::test]
    async fn update_keeps_type_when_omitted() {
        let deps = test_deps();
        let save = SaveInsulin::new(deps.clone());
        let update = UpdateInsulin::new(deps.clone());

        save.execute(
            &test_context("p-1"),
            json!({ "units": 12.0, "insulin_type": "basal" }),
        )
        .await
        .unwrap();

        let out = update
            .execute(&test_context("p-1"), json!({ "units": 14.0 }))
            .await
            .expect("update should succeed");
        assert!(!out.is_error);

        let latest = deps
            .records
            .lock()
            .await
            .latest_record(&PatientId::from("p-1"), Category::Insulin)
            .unwrap()
            .unwrap();
        assert_eq!(
            latest.measurement,
            Measurement::Insulin {
                units: 14.0,
                kind: InsulinKind::Basal
            }
        );
    }

    #[tokio::test]
    async fn update_without_history_is_soft_error() {
        let tool = UpdateInsulin::new(test_deps());

        let out = tool
            .execute(&test_context("p-1"), json!({ "units": 10.0 }))
            .await
            .expect("tool should not hard-fail");

        assert!(out.is_error);
        assert!(out.content.contains("no existing"));
    }
}
