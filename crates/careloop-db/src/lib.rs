pub mod patient_store;
pub mod record_store;
pub mod schedule_store;
pub mod session_store;

pub use patient_store::{Patient, PatientStore};
pub use record_store::{HealthRecord, RecordStore};
pub use schedule_store::{FireOutcome, OutreachSchedule, ScheduleStore};
pub use session_store::{ConversationSession, SessionStatus, SessionStore};

use chrono::{DateTime, Utc};
use tracing::warn;

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("failed to parse timestamp '{value}': {e}, falling back to now");
            Utc::now()
        })
}

/// Parse a stored enum column inside a `query_map` closure.
pub(crate) fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
