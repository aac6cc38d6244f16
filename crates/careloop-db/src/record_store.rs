use careloop_common::{Category, Error, Measurement, MeasurementDraft, PatientId, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::info;

use crate::{parse_column, parse_timestamp};

/// A persisted health record row.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub id: String,
    pub patient_id: PatientId,
    pub category: Category,
    pub measurement: Measurement,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Set when the value fell outside plausible bounds at save time.
    pub unusual: bool,
}

const RECORD_COLUMNS: &str =
    "id, patient_id, category, payload, note, recorded_at, unusual";

/// Storage for agent-submitted health measurements.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening record store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS health_records (
                    id TEXT PRIMARY KEY,
                    patient_id TEXT NOT NULL,
                    category TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    note TEXT,
                    recorded_at TEXT NOT NULL,
                    unusual INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_records_patient_category
                    ON health_records(patient_id, category, recorded_at);",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Persist a measurement draft. Returns the new record id.
    pub fn insert_record(&self, draft: &MeasurementDraft, unusual: bool) -> Result<String> {
        let record_id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&draft.measurement)?;
        self.conn
            .execute(
                "INSERT INTO health_records (id, patient_id, category, payload, note, recorded_at, unusual)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record_id,
                    draft.patient_id.as_str(),
                    draft.measurement.category().as_str(),
                    payload,
                    draft.note,
                    draft.recorded_at.to_rfc3339(),
                    unusual,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to insert record: {e}")))?;
        Ok(record_id)
    }

    /// The most recent record of a category for a patient, by recorded
    /// timestamp (insertion order is not relied on).
    pub fn latest_record(
        &self,
        patient_id: &PatientId,
        category: Category,
    ) -> Result<Option<HealthRecord>> {
        let mut records = self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM health_records
                 WHERE patient_id = ?1 AND category = ?2
                 ORDER BY recorded_at DESC, created_at DESC
                 LIMIT 1"
            ),
            params![patient_id.as_str(), category.as_str()],
        )?;
        Ok(records.pop())
    }

    /// The most recent record holding a specific measurement kind. A
    /// wellness category row may carry sleep, stress, or dizziness; a
    /// correction must not cross kinds.
    pub fn latest_record_of_kind(
        &self,
        patient_id: &PatientId,
        category: Category,
        kind_tag: &str,
    ) -> Result<Option<HealthRecord>> {
        let mut records = self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM health_records
                 WHERE patient_id = ?1 AND category = ?2
                   AND json_extract(payload, '$.kind') = ?3
                 ORDER BY recorded_at DESC, created_at DESC
                 LIMIT 1"
            ),
            params![patient_id.as_str(), category.as_str(), kind_tag],
        )?;
        Ok(records.pop())
    }

    /// Overwrite the payload of an existing record. Last write wins.
    /// Returns false if the record does not exist.
    pub fn update_record(
        &self,
        record_id: &str,
        measurement: &Measurement,
        note: Option<&str>,
        unusual: bool,
    ) -> Result<bool> {
        let payload = serde_json::to_string(measurement)?;
        let rows = self
            .conn
            .execute(
                "UPDATE health_records
                 SET payload = ?1, note = COALESCE(?2, note), unusual = ?3
                 WHERE id = ?4",
                params![payload, note, unusual, record_id],
            )
            .map_err(|e| Error::Database(format!("failed to update record: {e}")))?;
        Ok(rows > 0)
    }

    /// Records of a category within a date range, oldest first.
    pub fn records_between(
        &self,
        patient_id: &PatientId,
        category: Category,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HealthRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM health_records
                 WHERE patient_id = ?1 AND category = ?2
                   AND datetime(recorded_at) >= datetime(?3)
                   AND datetime(recorded_at) <= datetime(?4)
                 ORDER BY recorded_at ASC"
            ),
            params![
                patient_id.as_str(),
                category.as_str(),
                from.to_rfc3339(),
                to.to_rfc3339()
            ],
        )
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<HealthRecord>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare record query: {e}")))?;

        let rows = stmt
            .query_map(params, |row| {
                let patient_id: String = row.get(1)?;
                let category_raw: String = row.get(2)?;
                let payload_raw: String = row.get(3)?;
                let recorded_at_raw: String = row.get(5)?;
                let measurement: Measurement =
                    serde_json::from_str(&payload_raw).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                Ok(HealthRecord {
                    id: row.get(0)?,
                    patient_id: PatientId(patient_id),
                    category: parse_column(2, &category_raw)?,
                    measurement,
                    note: row.get(4)?,
                    recorded_at: parse_timestamp(&recorded_at_raw),
                    unusual: row.get(6)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to load records: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            records
                .push(row.map_err(|e| Error::Database(format!("failed to read record row: {e}")))?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careloop_common::InsulinKind;
    use chrono::Duration;

    fn glucose_draft(patient: &str, mg_dl: f64, at: DateTime<Utc>) -> MeasurementDraft {
        MeasurementDraft::new(PatientId::from(patient), Measurement::Glucose { mg_dl }).at(at)
    }

    #[test]
    fn insert_and_latest_round_trip() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        let now = Utc::now();

        store
            .insert_record(&glucose_draft("p-1", 104.0, now - Duration::hours(3)), false)
            .expect("insert should succeed");
        let latest_id = store
            .insert_record(&glucose_draft("p-1", 121.0, now), false)
            .expect("insert should succeed");

        let latest = store
            .latest_record(&PatientId::from("p-1"), Category::Glucometry)
            .expect("query should succeed")
            .expect("record should exist");
        assert_eq!(latest.id, latest_id);
        assert_eq!(latest.measurement, Measurement::Glucose { mg_dl: 121.0 });
        assert!(!latest.unusual);
    }

    #[test]
    fn latest_orders_by_recorded_at_not_insertion() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        let now = Utc::now();

        // Insert the newer reading first; a backfilled older reading second.
        let newer = store
            .insert_record(&glucose_draft("p-1", 140.0, now), false)
            .unwrap();
        store
            .insert_record(&glucose_draft("p-1", 90.0, now - Duration::days(1)), false)
            .unwrap();

        let latest = store
            .latest_record(&PatientId::from("p-1"), Category::Glucometry)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, newer);
    }

    #[test]
    fn latest_is_scoped_to_patient_and_category() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        let now = Utc::now();
        store
            .insert_record(&glucose_draft("p-1", 100.0, now), false)
            .unwrap();

        assert!(
            store
                .latest_record(&PatientId::from("p-2"), Category::Glucometry)
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .latest_record(&PatientId::from("p-1"), Category::Insulin)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn latest_of_kind_skips_other_wellness_kinds() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        let now = Utc::now();

        let sleep_id = store
            .insert_record(
                &MeasurementDraft::new(
                    PatientId::from("p-1"),
                    Measurement::Sleep { hours: 6.0 },
                )
                .at(now - Duration::hours(8)),
                false,
            )
            .unwrap();
        store
            .insert_record(
                &MeasurementDraft::new(
                    PatientId::from("p-1"),
                    Measurement::Stress { level: 7 },
                )
                .at(now),
                false,
            )
            .unwrap();

        // The stress entry is newer, but a sleep lookup must not see it.
        let latest = store
            .latest_record_of_kind(&PatientId::from("p-1"), Category::Wellness, "sleep")
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, sleep_id);

        assert!(
            store
                .latest_record_of_kind(&PatientId::from("p-1"), Category::Wellness, "dizziness")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn update_record_overwrites_payload() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        let id = store
            .insert_record(&glucose_draft("p-1", 100.0, Utc::now()), false)
            .unwrap();

        let updated = store
            .update_record(&id, &Measurement::Glucose { mg_dl: 108.0 }, None, false)
            .expect("update should succeed");
        assert!(updated);

        let latest = store
            .latest_record(&PatientId::from("p-1"), Category::Glucometry)
            .unwrap()
            .unwrap();
        assert_eq!(latest.measurement, Measurement::Glucose { mg_dl: 108.0 });

        assert!(
            !store
                .update_record("missing", &Measurement::Glucose { mg_dl: 1.0 }, None, false)
                .unwrap()
        );
    }

    #[test]
    fn unusual_flag_persists() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        store
            .insert_record(&glucose_draft("p-1", 40.0, Utc::now()), true)
            .unwrap();

        let latest = store
            .latest_record(&PatientId::from("p-1"), Category::Glucometry)
            .unwrap()
            .unwrap();
        assert!(latest.unusual);
    }

    #[test]
    fn records_between_filters_range() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        let now = Utc::now();

        store
            .insert_record(&glucose_draft("p-1", 95.0, now - Duration::days(10)), false)
            .unwrap();
        store
            .insert_record(&glucose_draft("p-1", 105.0, now - Duration::days(2)), false)
            .unwrap();
        store
            .insert_record(&glucose_draft("p-1", 115.0, now - Duration::hours(1)), false)
            .unwrap();

        let week = store
            .records_between(
                &PatientId::from("p-1"),
                Category::Glucometry,
                now - Duration::days(7),
                now,
            )
            .expect("range query should succeed");
        assert_eq!(week.len(), 2);
        assert_eq!(week[0].measurement, Measurement::Glucose { mg_dl: 105.0 });
        assert_eq!(week[1].measurement, Measurement::Glucose { mg_dl: 115.0 });
    }

    #[test]
    fn insulin_payload_round_trips_kind() {
        let store = RecordStore::in_memory().expect("in-memory store should open");
        let draft = MeasurementDraft::new(
            PatientId::from("p-1"),
            Measurement::Insulin {
                units: 12.0,
                kind: InsulinKind::Basal,
            },
        );
        store.insert_record(&draft, false).unwrap();

        let latest = store
            .latest_record(&PatientId::from("p-1"), Category::Insulin)
            .unwrap()
            .unwrap();
        assert_eq!(
            latest.measurement,
            Measurement::Insulin {
                units: 12.0,
                kind: InsulinKind::Basal
            }
        );
    }
}
