use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Category, InsulinKind, PatientId};

/// One health measurement as proposed by a conversational tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Measurement {
    Glucose {
        mg_dl: f64,
    },
    Insulin {
        units: f64,
        // Serialized name must not collide with the enum tag.
        #[serde(rename = "insulin_kind")]
        kind: InsulinKind,
    },
    Sleep {
        hours: f64,
    },
    Stress {
        level: u8,
    },
    Dizziness {
        severity: u8,
    },
}

impl Measurement {
    pub fn category(&self) -> Category {
        match self {
            Measurement::Glucose { .. } => Category::Glucometry,
            Measurement::Insulin { .. } => Category::Insulin,
            Measurement::Sleep { .. }
            | Measurement::Stress { .. }
            | Measurement::Dizziness { .. } => Category::Wellness,
        }
    }

    /// The serialized payload tag, one per variant. Used to scope
    /// latest-record lookups to a single measurement kind.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Measurement::Glucose { .. } => "glucose",
            Measurement::Insulin { .. } => "insulin",
            Measurement::Sleep { .. } => "sleep",
            Measurement::Stress { .. } => "stress",
            Measurement::Dizziness { .. } => "dizziness",
        }
    }
}

/// Payload a tool invocation proposes to persist. Transient: either becomes
/// a stored record or is rejected within the same call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementDraft {
    pub patient_id: PatientId,
    pub measurement: Measurement,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MeasurementDraft {
    pub fn new(patient_id: PatientId, measurement: Measurement) -> Self {
        Self {
            patient_id,
            measurement,
            note: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }
}
