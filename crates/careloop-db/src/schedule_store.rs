use careloop_common::{
    Category, Error, Frequency, OutreachChannel, PatientId, Result, ScheduleId,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::info;

use crate::{parse_column, parse_timestamp};

/// A recurring or one-off outreach schedule for one patient and channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutreachSchedule {
    pub id: ScheduleId,
    pub patient_id: PatientId,
    pub channel: OutreachChannel,
    pub category: Category,
    pub frequency: Frequency,
    /// Local wall-clock time of day, "HH:MM".
    pub scheduled_time: String,
    /// Explicit date for `once` schedules.
    pub explicit_date: Option<NaiveDate>,
    /// Number to dial instead of the patient's profile phone.
    pub phone_override: Option<String>,
    pub is_active: bool,
    /// Derived, recomputed on every fire or edit; never trusted as stored
    /// truth across offset changes.
    pub next_run: DateTime<Utc>,
}

/// What a successful fire claim does to the schedule row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FireOutcome {
    /// Daily schedule: advance to the next day's run instant.
    Reschedule(DateTime<Utc>),
    /// Once schedule: fired, never again.
    Deactivate,
}

const SCHEDULE_COLUMNS: &str =
    "id, patient_id, channel, category, frequency, scheduled_time, explicit_date, phone_override, is_active, next_run";

pub struct ScheduleStore {
    conn: Connection,
}

impl ScheduleStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening schedule store at {}", db_path.display());
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
                "CREATE TABLE IF NOT EXISTS outreach_schedules (
                    id TEXT PRIMARY KEY,
                    patient_id TEXT NOT NULL,
                    channel TEXT NOT NULL,
                    category TEXT NOT NULL,
                    frequency TEXT NOT NULL,
                    scheduled_time TEXT NOT NULL,
                    explicit_date TEXT,
                    phone_override TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    next_run TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_schedules_due
                    ON outreach_schedules(next_run) WHERE is_active = 1;
                CREATE INDEX IF NOT EXISTS idx_schedules_patient
                    ON outreach_schedules(patient_id);",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub fn upsert_schedule(&self, schedule: &OutreachSchedule) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO outreach_schedules
                   (id, patient_id, channel, category, frequency, scheduled_time,
                    explicit_date, phone_override, is_active, next_run)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                   channel = excluded.channel,
                   category = excluded.category,
                   frequency = excluded.frequency,
                   scheduled_time = excluded.scheduled_time,
                   explicit_date = excluded.explicit_date,
                   phone_override = excluded.phone_override,
                   is_active = excluded.is_active,
                   next_run = excluded.next_run,
                   updated_at = datetime('now')",
                params![
                    schedule.id.as_str(),
                    schedule.patient_id.as_str(),
                    schedule.channel.as_str(),
                    schedule.category.as_str(),
                    schedule.frequency.as_str(),
                    schedule.scheduled_time,
                    schedule.explicit_date.map(|d| d.to_string()),
                    schedule.phone_override,
                    schedule.is_active,
                    schedule.next_run.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to upsert schedule: {e}")))?;
        Ok(())
    }

    pub fn get_schedule(&self, id: &ScheduleId) -> Result<Option<OutreachSchedule>> {
        let mut schedules = self.query_schedules(
            &format!("SELECT {SCHEDULE_COLUMNS} FROM outreach_schedules WHERE id = ?1"),
            params![id.as_str()],
        )?;
        Ok(schedules.pop())
    }

    pub fn list_for_patient(&self, patient_id: &PatientId) -> Result<Vec<OutreachSchedule>> {
        self.query_schedules(
            &format!(
                "SELECT {SCHEDULE_COLUMNS} FROM outreach_schedules
                 WHERE patient_id = ?1 ORDER BY created_at ASC"
            ),
            params![patient_id.as_str()],
        )
    }

    /// All active schedules whose next run instant has passed.
    pub fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<OutreachSchedule>> {
        self.query_schedules(
            &format!(
                "SELECT {SCHEDULE_COLUMNS} FROM outreach_schedules
                 WHERE is_active = 1 AND datetime(next_run) <= datetime(?1)
                 ORDER BY next_run ASC"
            ),
            params![now.to_rfc3339()],
        )
    }

    /// Claim a firing. The update is conditional on the previous `next_run`
    /// value, so of two concurrent callers racing on the same due schedule
    /// exactly one sees `true`.
    pub fn claim_fire(
        &self,
        id: &ScheduleId,
        expected_next_run: DateTime<Utc>,
        outcome: FireOutcome,
    ) -> Result<bool> {
        let rows = match outcome {
            FireOutcome::Reschedule(next_run) => self
                .conn
                .execute(
                    "UPDATE outreach_schedules
                     SET next_run = ?1, updated_at = datetime('now')
                     WHERE id = ?2 AND next_run = ?3 AND is_active = 1",
                    params![
                        next_run.to_rfc3339(),
                        id.as_str(),
                        expected_next_run.to_rfc3339()
                    ],
                )
                .map_err(|e| Error::Database(format!("failed to claim fire: {e}")))?,
            FireOutcome::Deactivate => self
                .conn
                .execute(
                    "UPDATE outreach_schedules
                     SET is_active = 0, updated_at = datetime('now')
                     WHERE id = ?1 AND next_run = ?2 AND is_active = 1",
                    params![id.as_str(), expected_next_run.to_rfc3339()],
                )
                .map_err(|e| Error::Database(format!("failed to claim fire: {e}")))?,
        };
        Ok(rows > 0)
    }

    /// Deactivate a schedule (cancellation). An in-flight firing that already
    /// claimed its run is unaffected; future due queries skip the row.
    pub fn deactivate(&self, id: &ScheduleId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE outreach_schedules
                 SET is_active = 0, updated_at = datetime('now')
                 WHERE id = ?1 AND is_active = 1",
                params![id.as_str()],
            )
            .map_err(|e| Error::Database(format!("failed to deactivate schedule: {e}")))?;
        Ok(rows > 0)
    }

    pub fn delete(&self, id: &ScheduleId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM outreach_schedules WHERE id = ?1",
                params![id.as_str()],
            )
            .map_err(|e| Error::Database(format!("failed to delete schedule: {e}")))?;
        Ok(rows > 0)
    }

    fn query_schedules(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<OutreachSchedule>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare schedule query: {e}")))?;

        let rows = stmt
            .query_map(params, |row| {
                let id: String = row.get(0)?;
                let patient_id: String = row.get(1)?;
                let channel_raw: String = row.get(2)?;
                let category_raw: String = row.get(3)?;
                let frequency_raw: String = row.get(4)?;
                let explicit_date_raw: Option<String> = row.get(6)?;
                let next_run_raw: String = row.get(9)?;
                Ok(OutreachSchedule {
                    id: ScheduleId(id),
                    patient_id: PatientId(patient_id),
                    channel: parse_column(2, &channel_raw)?,
                    category: parse_column(3, &category_raw)?,
                    frequency: parse_column(4, &frequency_raw)?,
                    scheduled_time: row.get(5)?,
                    explicit_date: explicit_date_raw.and_then(|d| d.parse().ok()),
                    phone_override: row.get(7)?,
                    is_active: row.get(8)?,
                    next_run: parse_timestamp(&next_run_raw),
                })
            })
            .map_err(|e| Error::Database(format!("failed to load schedules: {e}")))?;

        let mut schedules = Vec::new();
        for row in rows {
            schedules.push(
                row.map_err(|e| Error::Database(format!("failed to read schedule row: {e}")))?,
            );
        }
        Ok(schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_schedule(next_run: DateTime<Utc>) -> OutreachSchedule {
        OutreachSchedule {
            id: ScheduleId::from("sch-1"),
            patient_id: PatientId::from("p-1"),
            channel: OutreachChannel::Call,
            category: Category::Glucometry,
            frequency: Frequency::Daily,
            scheduled_time: "09:30".to_string(),
            explicit_date: None,
            phone_override: None,
            is_active: true,
            next_run,
        }
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let store = ScheduleStore::in_memory().expect("in-memory store should open");
        let mut schedule = sample_schedule(Utc::now() + Duration::hours(1));
        schedule.phone_override = Some("+34999888777".to_string());
        store.upsert_schedule(&schedule).expect("upsert should succeed");

        let loaded = store
            .get_schedule(&schedule.id)
            .expect("get should succeed")
            .expect("schedule should exist");
        assert_eq!(loaded.channel, OutreachChannel::Call);
        assert_eq!(loaded.scheduled_time, "09:30");
        assert_eq!(loaded.phone_override.as_deref(), Some("+34999888777"));
        assert_eq!(loaded.next_run, schedule.next_run);
    }

    #[test]
    fn due_schedules_returns_only_past_active() {
        let store = ScheduleStore::in_memory().expect("in-memory store should open");
        let now = Utc::now();

        let mut due = sample_schedule(now - Duration::minutes(5));
        due.id = ScheduleId::from("due");
        store.upsert_schedule(&due).unwrap();

        let mut future = sample_schedule(now + Duration::hours(1));
        future.id = ScheduleId::from("future");
        store.upsert_schedule(&future).unwrap();

        let mut inactive = sample_schedule(now - Duration::minutes(5));
        inactive.id = ScheduleId::from("inactive");
        inactive.is_active = false;
        store.upsert_schedule(&inactive).unwrap();

        let found = store.due_schedules(now).expect("due query should succeed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ScheduleId::from("due"));
    }

    #[test]
    fn claim_fire_is_exclusive() {
        let store = ScheduleStore::in_memory().expect("in-memory store should open");
        let next_run = Utc::now() - Duration::minutes(1);
        let schedule = sample_schedule(next_run);
        store.upsert_schedule(&schedule).unwrap();
        let stored = store.get_schedule(&schedule.id).unwrap().unwrap();

        let tomorrow = stored.next_run + Duration::days(1);

        // Two callers race on the same expected next_run.
        let first = store
            .claim_fire(&schedule.id, stored.next_run, FireOutcome::Reschedule(tomorrow))
            .expect("claim should succeed");
        let second = store
            .claim_fire(&schedule.id, stored.next_run, FireOutcome::Reschedule(tomorrow))
            .expect("claim should succeed");

        assert!(first, "first caller wins the claim");
        assert!(!second, "second caller loses the claim");
    }

    #[test]
    fn claim_fire_deactivates_once_schedules() {
        let store = ScheduleStore::in_memory().expect("in-memory store should open");
        let mut schedule = sample_schedule(Utc::now() - Duration::minutes(1));
        schedule.frequency = Frequency::Once;
        store.upsert_schedule(&schedule).unwrap();
        let stored = store.get_schedule(&schedule.id).unwrap().unwrap();

        assert!(
            store
                .claim_fire(&schedule.id, stored.next_run, FireOutcome::Deactivate)
                .unwrap()
        );

        let after = store.get_schedule(&schedule.id).unwrap().unwrap();
        assert!(!after.is_active);

        // Never due again, for any future now.
        let far_future = Utc::now() + Duration::days(365);
        assert!(store.due_schedules(far_future).unwrap().is_empty());
    }

    #[test]
    fn deactivate_prevents_future_firing() {
        let store = ScheduleStore::in_memory().expect("in-memory store should open");
        let schedule = sample_schedule(Utc::now() - Duration::minutes(1));
        store.upsert_schedule(&schedule).unwrap();

        assert!(store.deactivate(&schedule.id).unwrap());
        assert!(!store.deactivate(&schedule.id).unwrap());
        assert!(store.due_schedules(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_row() {
        let store = ScheduleStore::in_memory().expect("in-memory store should open");
        let schedule = sample_schedule(Utc::now());
        store.upsert_schedule(&schedule).unwrap();

        assert!(store.delete(&schedule.id).unwrap());
        assert!(store.get_schedule(&schedule.id).unwrap().is_none());
        assert!(!store.delete(&schedule.id).unwrap());
    }

    #[test]
    fn list_for_patient_scopes_rows() {
        let store = ScheduleStore::in_memory().expect("in-memory store should open");
        let mut a = sample_schedule(Utc::now());
        a.id = ScheduleId::from("a");
        store.upsert_schedule(&a).unwrap();

        let mut b = sample_schedule(Utc::now());
        b.id = ScheduleId::from("b");
        b.patient_id = PatientId::from("p-2");
        store.upsert_schedule(&b).unwrap();

        let schedules = store.list_for_patient(&PatientId::from("p-1")).unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].id, ScheduleId::from("a"));
    }
}
