use async_trait::async_trait;
use careloop_common::{Category, Error, Measurement, Result};
use serde_json::json;

use crate::tools::{save_measurement, update_latest, Tool, ToolContext, ToolDeps, ToolOutput};

/// Subjective 0-10 scale shared by stress and dizziness.
fn parse_scale(args: &serde_json::Value, field: &str) -> Result<u8> {
    let value = args[field]
        .as_u64()
        .ok_or_else(|| Error::Validation(format!("missing or invalid '{field}' argument")))?;
    if value > 10 {
        return Err(Error::Validation(format!(
            "{field} must be between 0 and 10"
        )));
    }
    Ok(value as u8)
}

// ---------------------------------------------------------------------------
// Stress
// ---------------------------------------------------------------------------

/// Tool for recording the patient's self-reported stress level.
pub struct SaveStress {
    deps: ToolDeps,
}

impl SaveStress {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for SaveStress {
    fn name(&self) -> &'static str {
        "save_stress_level"
    }

    fn description(&self) -> &'static str {
        "Save the patient's self-reported stress level on a 0-10 scale, \
         where 0 is completely relaxed and 10 is the worst stress imaginable."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "level": {
                    "type": "integer",
                    "description": "Stress level, 0-10"
                },
                "note": {
                    "type": "string",
                    "description": "Optional context, e.g. 'work deadline'"
                },
                "recorded_at": {
                    "type": "string",
                    "description": "RFC 3339 timestamp. Defaults to now."
                }
            },
            "required": ["level"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let level = parse_scale(&args, "level")?;
        save_measurement(
            &self.deps,
            context,
            Measurement::Stress { level },
            &args,
            format!("Stress level of {level}/10 saved."),
        )
        .await
    }
}

/// Tool for correcting the most recent stress entry.
pub struct UpdateStress {
    deps: ToolDeps,
}

impl UpdateStress {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for UpdateStress {
    fn name(&self) -> &'static str {
        "update_stress_level"
    }

    fn description(&self) -> &'static str {
        "Correct the patient's most recent stress entry. Replaces the value \
         of the latest wellness record."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "level": {
                    "type": "integer",
                    "description": "Corrected stress level, 0-10"
                },
                "note": {
                    "type": "string",
                    "description": "Optional replacement note"
                }
            },
            "required": ["level"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let level = parse_scale(&args, "level")?;
        update_latest(
            &self.deps,
            context,
            Category::Wellness,
            Measurement::Stress { level },
            &args,
            format!("Latest stress entry corrected to {level}/10."),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Dizziness
// ---------------------------------------------------------------------------

/// Tool for recording a dizziness episode.
pub struct SaveDizziness {
    deps: ToolDeps,
}

impl SaveDizziness {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for SaveDizziness {
    fn name(&self) -> &'static str {
        "save_dizziness_episode"
    }

    fn description(&self) -> &'static str {
        "Save a dizziness episode the patient reported, with a 0-10 severity \
         where 0 is none and 10 is unable to stand."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "severity": {
                    "type": "integer",
                    "description": "Dizziness severity, 0-10"
                },
                "note": {
                    "type": "string",
                    "description": "Optional context, e.g. 'after standing up'"
                },
                "recorded_at": {
                    "type": "string",
                    "description": "RFC 3339 timestamp. Defaults to now."
                }
            },
            "required": ["severity"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let severity = parse_scale(&args, "severity")?;
        save_measurement(
            &self.deps,
            context,
            Measurement::Dizziness { severity },
            &args,
            format!("Dizziness episode of severity {severity}/10 saved."),
        )
        .await
    }
}

/// Tool for correcting the most recent dizziness entry.
pub struct UpdateDizziness {
    deps: ToolDeps,
}

impl UpdateDizziness {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for UpdateDizziness {
    fn name(&self) -> &'static str {
        "update_dizziness_episode"
    }

    fn description(&self) -> &'static str {
        "Correct the patient's most recent dizziness entry. Replaces the \
         value of the latest wellness record."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "severity": {
                    "type": "integer",
                    "description": "Corrected dizziness severity, 0-10"
                },
                "note": {
                    "type": "string",
                    "description": "Optional replacement note"
                }
            },
            "required": ["severity"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let severity = parse_scale(&args, "severity")?;
        update_latest(
            &self.deps,
            context,
            Category::Wellness,
            Measurement::Dizziness { severity },
            &args,
            format!("Latest dizziness entry corrected to {severity}/10."),
        )
        .await
    }
}
