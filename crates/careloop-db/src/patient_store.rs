use careloop_common::{Error, PatientId, Result};
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::info;

/// Patient profile as read by the agent layer. Owned by the external
/// patient-record system; this store mirrors the attributes outreach needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub age: Option<u32>,
    pub diabetes_type: Option<String>,
    pub diagnosis_year: Option<i32>,
    pub phone: Option<String>,
    /// Fixed UTC offset for the patient's wall clock, in minutes.
    pub utc_offset_minutes: i32,
}

pub struct PatientStore {
    conn: Connection,
}

impl PatientStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening patient store at {}", db_path.display());
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
                "CREATE TABLE IF NOT EXISTS patients (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    age INTEGER,
                    diabetes_type TEXT,
                    diagnosis_year INTEGER,
                    phone TEXT,
                    utc_offset_minutes INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_patients_phone ON patients(phone);",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub fn upsert_patient(&self, patient: &Patient) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO patients (id, name, age, diabetes_type, diagnosis_year, phone, utc_offset_minutes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   age = excluded.age,
                   diabetes_type = excluded.diabetes_type,
                   diagnosis_year = excluded.diagnosis_year,
                   phone = excluded.phone,
                   utc_offset_minutes = excluded.utc_offset_minutes,
                   updated_at = datetime('now')",
                params![
                    patient.id.as_str(),
                    patient.name,
                    patient.age,
                    patient.diabetes_type,
                    patient.diagnosis_year,
                    patient.phone,
                    patient.utc_offset_minutes,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to upsert patient: {e}")))?;
        Ok(())
    }

    pub fn get_patient(&self, id: &PatientId) -> Result<Option<Patient>> {
        self.query_one(
            "SELECT id, name, age, diabetes_type, diagnosis_year, phone, utc_offset_minutes
             FROM patients WHERE id = ?1",
            params![id.as_str()],
        )
    }

    /// Resolve a patient by phone number, used to bind inbound WhatsApp
    /// messages to an identity.
    pub fn find_by_phone(&self, phone: &str) -> Result<Option<Patient>> {
        self.query_one(
            "SELECT id, name, age, diabetes_type, diagnosis_year, phone, utc_offset_minutes
             FROM patients WHERE phone = ?1",
            params![phone],
        )
    }

    fn query_one(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<Patient>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare patient query: {e}")))?;

        let mut rows = stmt
            .query_map(params, |row| {
                let id: String = row.get(0)?;
                Ok(Patient {
                    id: PatientId(id),
                    name: row.get(1)?,
                    age: row.get(2)?,
                    diabetes_type: row.get(3)?,
                    diagnosis_year: row.get(4)?,
                    phone: row.get(5)?,
                    utc_offset_minutes: row.get(6)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to load patient: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(
                row.map_err(|e| Error::Database(format!("failed to read patient row: {e}")))?,
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_patient() -> Patient {
        Patient {
            id: PatientId::from("p-1"),
            name: "Ana García".to_string(),
            age: Some(54),
            diabetes_type: Some("type 2".to_string()),
            diagnosis_year: Some(2019),
            phone: Some("+34600111222".to_string()),
            utc_offset_minutes: 120,
        }
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let store = PatientStore::in_memory().expect("in-memory store should open");
        let patient = sample_patient();
        store.upsert_patient(&patient).expect("upsert should succeed");

        let loaded = store
            .get_patient(&patient.id)
            .expect("get should succeed")
            .expect("patient should exist");
        assert_eq!(loaded, patient);
    }

    #[test]
    fn upsert_overwrites_profile() {
        let store = PatientStore::in_memory().expect("in-memory store should open");
        let mut patient = sample_patient();
        store.upsert_patient(&patient).unwrap();

        patient.phone = Some("+34600999888".to_string());
        store.upsert_patient(&patient).unwrap();

        let loaded = store.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(loaded.phone.as_deref(), Some("+34600999888"));
    }

    #[test]
    fn find_by_phone_binds_identity() {
        let store = PatientStore::in_memory().expect("in-memory store should open");
        store.upsert_patient(&sample_patient()).unwrap();

        let found = store.find_by_phone("+34600111222").unwrap();
        assert_eq!(found.unwrap().id, PatientId::from("p-1"));

        let missing = store.find_by_phone("+10000000000").unwrap();
        assert!(missing.is_none());
    }
}
