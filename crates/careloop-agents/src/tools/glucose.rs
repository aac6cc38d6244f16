use async_trait::async_trait;
use careloop_common::{Category, Error, Measurement, Result};
use serde_json::json;

use crate::tools::{save_measurement, update_latest, Tool, ToolContext, ToolDeps, ToolOutput};

fn parse_mg_dl(args: &serde_json::Value) -> Result<f64> {
    let mg_dl = args["mg_dl"]
        .as_f64()
        .ok_or_else(|| Error::Validation("missing or invalid 'mg_dl' argument".to_string()))?;
    if mg_dl <= 0.0 {
        return Err(Error::Validation("mg_dl must be positive".to_string()));
    }
    Ok(mg_dl)
}

// ---------------------------------------------------------------------------
// SaveGlucose
// ---------------------------------------------------------------------------

/// Tool for recording a blood glucose reading.
pub struct SaveGlucose {
    deps: ToolDeps,
}

impl SaveGlucose {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for SaveGlucose {
    fn name(&self) -> &'static str {
        "save_glucose_reading"
    }

    fn description(&self) -> &'static str {
        "Save a blood glucose reading reported by the patient, in mg/dL. \
         Optionally include a note (e.g. 'before breakfast') and the time the \
         reading was taken if it was not just now."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "mg_dl": {
                    "type": "number",
                    "description": "Blood glucose value in mg/dL"
                },
                "note": {
                    "type": "string",
                    "description": "Optional context, e.g. 'fasting' or 'after lunch'"
                },
                "recorded_at": {
                    "type": "string",
                    "description": "RFC 3339 timestamp of the reading. Defaults to now."
                }
            },
            "required": ["mg_dl"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let mg_dl = parse_mg_dl(&args)?;
        save_measurement(
            &self.deps,
            context,
            Measurement::Glucose { mg_dl },
            &args,
            format!("Glucose reading of {mg_dl} mg/dL saved."),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// UpdateGlucose
// ---------------------------------------------------------------------------

/// Tool for correcting the most recent glucose reading.
pub struct UpdateGlucose {
    deps: ToolDeps,
}

impl UpdateGlucose {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for UpdateGlucose {
    fn name(&self) -> &'static str {
        "update_glucose_reading"
    }

    fn description(&self) -> &'static str {
        "Correct the patient's most recent glucose reading, e.g. when they \
         misspoke or the value was transcribed wrong. Replaces the value of \
         the latest reading; it does not create a new one."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "mg_dl": {
                    "type": "number",
                    "description": "Corrected blood glucose value in mg/dL"
                },
                "note": {
                    "type": "string",
                    "description": "Optional replacement note"
                }
            },
            "required": ["mg_dl"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let mg_dl = parse_mg_dl(&args)?;
        update_latest(
            &self.deps,
            context,
            Category::Glucometry,
            Measurement::Glucose { mg_dl },
            &args,
            format!("Latest glucose reading corrected to {mg_dl} mg/dL."),
        )
        .await
    }
}
