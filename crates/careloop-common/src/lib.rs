pub mod error;
pub mod measurement;
pub mod types;

pub use error::{Error, Result};
pub use measurement::{Measurement, MeasurementDraft};
pub use types::{Category, Frequency, InsulinKind, OutreachChannel, PatientId, ScheduleId};
