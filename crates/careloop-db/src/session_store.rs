use careloop_common::{Error, OutreachChannel, PatientId, Result, ScheduleId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::{parse_column, parse_timestamp};

/// Lifecycle of a conversation session. No transition leaves a terminal
/// state; providers may redeliver webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initiated => "initiated",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initiated" => Ok(SessionStatus::Initiated),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(Error::Database(format!("unknown session status: '{other}'"))),
        }
    }
}

/// One call or message conversation, keyed by the provider-issued
/// conversation id.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: String,
    pub patient_id: PatientId,
    pub channel: OutreachChannel,
    pub schedule_id: Option<ScheduleId>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub duration_secs: Option<i64>,
    pub failure_reason: Option<String>,
}

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening session store at {}", db_path.display());
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
                "CREATE TABLE IF NOT EXISTS conversation_sessions (
                    id TEXT PRIMARY KEY,
                    patient_id TEXT NOT NULL,
                    channel TEXT NOT NULL,
                    schedule_id TEXT,
                    status TEXT NOT NULL DEFAULT 'initiated',
                    started_at TEXT NOT NULL,
                    duration_secs INTEGER,
                    failure_reason TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_patient
                    ON conversation_sessions(patient_id, started_at);",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Bind a provider conversation id to a patient. Re-opening an existing
    /// id is a no-op returning `false`.
    pub fn open_session(
        &self,
        conversation_id: &str,
        patient_id: &PatientId,
        channel: OutreachChannel,
        schedule_id: Option<&ScheduleId>,
        started_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO conversation_sessions
                   (id, patient_id, channel, schedule_id, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, 'initiated', ?5)",
                params![
                    conversation_id,
                    patient_id.as_str(),
                    channel.as_str(),
                    schedule_id.map(|s| s.as_str().to_string()),
                    started_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to open session: {e}")))?;
        Ok(rows > 0)
    }

    pub fn mark_in_progress(&self, conversation_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE conversation_sessions SET status = 'in_progress'
                 WHERE id = ?1 AND status = 'initiated'",
                params![conversation_id],
            )
            .map_err(|e| Error::Database(format!("failed to mark session in progress: {e}")))?;
        Ok(rows > 0)
    }

    /// Record a completed conversation with its duration. Idempotent: a
    /// redelivered webhook for an already-terminal session changes nothing
    /// and returns `false`.
    pub fn complete(&self, conversation_id: &str, duration_secs: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE conversation_sessions
                 SET status = 'completed', duration_secs = ?1
                 WHERE id = ?2 AND status IN ('initiated', 'in_progress')",
                params![duration_secs, conversation_id],
            )
            .map_err(|e| Error::Database(format!("failed to complete session: {e}")))?;
        Ok(rows > 0)
    }

    /// Record a failed conversation with a reason. Same idempotency contract
    /// as [`complete`](Self::complete).
    pub fn fail(&self, conversation_id: &str, reason: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE conversation_sessions
                 SET status = 'failed', failure_reason = ?1
                 WHERE id = ?2 AND status IN ('initiated', 'in_progress')",
                params![reason, conversation_id],
            )
            .map_err(|e| Error::Database(format!("failed to fail session: {e}")))?;
        Ok(rows > 0)
    }

    pub fn get_session(&self, conversation_id: &str) -> Result<Option<ConversationSession>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, patient_id, channel, schedule_id, status, started_at,
                        duration_secs, failure_reason
                 FROM conversation_sessions WHERE id = ?1",
            )
            .map_err(|e| Error::Database(format!("failed to prepare session query: {e}")))?;

        let mut rows = stmt
            .query_map(params![conversation_id], |row| {
                let patient_id: String = row.get(1)?;
                let channel_raw: String = row.get(2)?;
                let schedule_id: Option<String> = row.get(3)?;
                let status_raw: String = row.get(4)?;
                let started_at_raw: String = row.get(5)?;
                Ok(ConversationSession {
                    id: row.get(0)?,
                    patient_id: PatientId(patient_id),
                    channel: parse_column(2, &channel_raw)?,
                    schedule_id: schedule_id.map(ScheduleId),
                    status: parse_column(4, &status_raw)?,
                    started_at: parse_timestamp(&started_at_raw),
                    duration_secs: row.get(6)?,
                    failure_reason: row.get(7)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to load session: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(
                row.map_err(|e| Error::Database(format!("failed to read session row: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    /// Most recent open (non-terminal) session for a patient on a channel,
    /// used to resume an inbound WhatsApp conversation.
    pub fn open_session_for_patient(
        &self,
        patient_id: &PatientId,
        channel: OutreachChannel,
    ) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM conversation_sessions
                 WHERE patient_id = ?1 AND channel = ?2
                   AND status IN ('initiated', 'in_progress')
                 ORDER BY started_at DESC LIMIT 1",
            )
            .map_err(|e| Error::Database(format!("failed to prepare session lookup: {e}")))?;

        match stmt.query_row(params![patient_id.as_str(), channel.as_str()], |row| {
            row.get::<_, String>(0)
        }) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Database(format!(
                "failed to look up open session: {e}"
            ))),
        }
    }
}
