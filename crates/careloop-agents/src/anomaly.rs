use careloop_common::Measurement;
use serde::{Deserialize, Serialize};

/// Plausibility bounds for the anomaly-confirmation policy.
///
/// The policy is advisory, not a gate: a syntactically valid value outside
/// a range still persists, annotated as unusual so the conversational layer
/// can ask a follow-up question on a later turn. The Tool Router is
/// stateless per call, so it cannot itself hold a confirmation dialogue;
/// rejecting outright would require conversation state it does not have.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlausibleRanges {
    pub glucose_mg_dl: (f64, f64),
    pub sleep_hours: (f64, f64),
    pub insulin_units: (f64, f64),
}

impl Default for PlausibleRanges {
    fn default() -> Self {
        Self {
            glucose_mg_dl: (70.0, 250.0),
            sleep_hours: (3.0, 12.0),
            insulin_units: (1.0, 60.0),
        }
    }
}

impl PlausibleRanges {
    /// Whether a measurement falls outside its plausible range. Stress and
    /// dizziness use a hard-validated 0-10 scale, so nothing on that scale
    /// counts as unusual.
    pub fn is_unusual(&self, measurement: &Measurement) -> bool {
        match measurement {
            Measurement::Glucose { mg_dl } => outside(*mg_dl, self.glucose_mg_dl),
            Measurement::Insulin { units, .. } => outside(*units, self.insulin_units),
            Measurement::Sleep { hours } => outside(*hours, self.sleep_hours),
            Measurement::Stress { .. } | Measurement::Dizziness { .. } => false,
        }
    }
}

fn outside(value: f64, (min, max): (f64, f64)) -> bool {
    value < min || value > max
}

#[cfg(test)]
mod tests {
    use super::*;
    use careloop_common::InsulinKind;

    #[test]
    fn glucose_bounds() {
        let ranges = PlausibleRanges::default();
        assert!(ranges.is_unusual(&Measurement::Glucose { mg_dl: 40.0 }));
        assert!(ranges.is_unusual(&Measurement::Glucose { mg_dl: 400.0 }));
        assert!(!ranges.is_unusual(&Measurement::Glucose { mg_dl: 110.0 }));
        // Boundary values are plausible.
        assert!(!ranges.is_unusual(&Measurement::Glucose { mg_dl: 70.0 }));
        assert!(!ranges.is_unusual(&Measurement::Glucose { mg_dl: 250.0 }));
    }

    #[test]
    fn sleep_and_insulin_bounds() {
        let ranges = PlausibleRanges::default();
        assert!(ranges.is_unusual(&Measurement::Sleep { hours: 1.5 }));
        assert!(ranges.is_unusual(&Measurement::Sleep { hours: 16.0 }));
        assert!(!ranges.is_unusual(&Measurement::Sleep { hours: 7.5 }));
        assert!(ranges.is_unusual(&Measurement::Insulin {
            units: 90.0,
            kind: InsulinKind::Rapid
        }));
    }

    #[test]
    fn scale_measurements_never_flag() {
        let ranges = PlausibleRanges::default();
        assert!(!ranges.is_unusual(&Measurement::Stress { level: 10 }));
        assert!(!ranges.is_unusual(&Measurement::Dizziness { severity: 0 }));
    }
}
