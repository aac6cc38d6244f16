use std::sync::Arc;

use careloop_common::{
    Category, Error, Frequency, OutreachChannel, PatientId, Result, ScheduleId,
};
use careloop_db::{FireOutcome, OutreachSchedule, PatientStore, ScheduleStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::calculator;

/// Parameters for creating or replacing a schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedule {
    pub channel: OutreachChannel,
    pub category: Category,
    pub frequency: Frequency,
    pub scheduled_time: String,
    pub explicit_date: Option<NaiveDate>,
    /// Dial this number instead of the patient's profile phone.
    pub phone_override: Option<String>,
}

/// Owns schedule CRUD and the due/fired decisions. Enum membership is
/// enforced by the request types; time format and past-date checks happen
/// here, at creation time, never silently.
pub struct OutreachScheduler {
    schedules: Arc<Mutex<ScheduleStore>>,
    patients: Arc<Mutex<PatientStore>>,
}

impl OutreachScheduler {
    pub fn new(schedules: Arc<Mutex<ScheduleStore>>, patients: Arc<Mutex<PatientStore>>) -> Self {
        Self { schedules, patients }
    }

    pub async fn create(
        &self,
        patient_id: &PatientId,
        request: NewSchedule,
        now: DateTime<Utc>,
    ) -> Result<OutreachSchedule> {
        let offset = self.patient_offset(patient_id).await?;
        let next_run = Self::compute_next_run(&request, offset, now)?;

        let schedule = OutreachSchedule {
            id: ScheduleId::new(),
            patient_id: patient_id.clone(),
            channel: request.channel,
            category: request.category,
            frequency: request.frequency,
            scheduled_time: request.scheduled_time,
            explicit_date: request.explicit_date,
            phone_override: request.phone_override,
            is_active: true,
            next_run,
        };

        self.schedules.lock().await.upsert_schedule(&schedule)?;
        info!(
            schedule_id = %schedule.id,
            patient_id = %patient_id,
            category = %schedule.category,
            next_run = %next_run,
            "schedule created"
        );
        Ok(schedule)
    }

    pub async fn update(
        &self,
        id: &ScheduleId,
        request: NewSchedule,
        now: DateTime<Utc>,
    ) -> Result<OutreachSchedule> {
        let existing = self
            .schedules
            .lock()
            .await
            .get_schedule(id)?
            .ok_or_else(|| Error::Validation(format!("unknown schedule: {id}")))?;

        let offset = self.patient_offset(&existing.patient_id).await?;
        let next_run = Self::compute_next_run(&request, offset, now)?;

        let schedule = OutreachSchedule {
            id: existing.id,
            patient_id: existing.patient_id,
            channel: request.channel,
            category: request.category,
            frequency: request.frequency,
            scheduled_time: request.scheduled_time,
            explicit_date: request.explicit_date,
            phone_override: request.phone_override,
            is_active: true,
            next_run,
        };
        self.schedules.lock().await.upsert_schedule(&schedule)?;
        Ok(schedule)
    }

    /// All active schedules due at `now`. The caller claims each one
    /// through [`on_fired`](Self::on_fired) before acting on it.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<OutreachSchedule>> {
        self.schedules.lock().await.due_schedules(now)
    }

    /// Claim a firing. Daily schedules advance to the next occurrence;
    /// `once` schedules deactivate. The claim is conditional on the
    /// schedule's previous `next_run`, so of two concurrent triggers
    /// racing on the same value exactly one gets `true`.
    pub async fn on_fired(
        &self,
        schedule: &OutreachSchedule,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let outcome = match schedule.frequency {
            Frequency::Daily => {
                let offset = self.patient_offset(&schedule.patient_id).await?;
                let next = calculator::next_run(&schedule.scheduled_time, offset, now)?;
                FireOutcome::Reschedule(next)
            }
            Frequency::Once => FireOutcome::Deactivate,
        };

        let claimed = self
            .schedules
            .lock()
            .await
            .claim_fire(&schedule.id, schedule.next_run, outcome)?;
        if !claimed {
            warn!(schedule_id = %schedule.id, "lost firing claim to a concurrent trigger");
        }
        Ok(claimed)
    }

    pub async fn deactivate(&self, id: &ScheduleId) -> Result<bool> {
        self.schedules.lock().await.deactivate(id)
    }

    pub async fn delete(&self, id: &ScheduleId) -> Result<bool> {
        self.schedules.lock().await.delete(id)
    }

    pub async fn list_for_patient(&self, patient_id: &PatientId) -> Result<Vec<OutreachSchedule>> {
        self.schedules.lock().await.list_for_patient(patient_id)
    }

    async fn patient_offset(&self, patient_id: &PatientId) -> Result<i32> {
        let patient = self
            .patients
            .lock()
            .await
            .get_patient(patient_id)?
            .ok_or_else(|| Error::Validation(format!("unknown patient: {patient_id}")))?;
        Ok(patient.utc_offset_minutes)
    }

    fn compute_next_run(
        request: &NewSchedule,
        utc_offset_minutes: i32,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        match request.frequency {
            Frequency::Daily => {
                calculator::next_run(&request.scheduled_time, utc_offset_minutes, now)
            }
            Frequency::Once => {
                let date = request.explicit_date.ok_or_else(|| {
                    Error::Validation("a once schedule requires an explicit date".to_string())
                })?;
                let run =
                    calculator::run_instant_on(date, &request.scheduled_time, utc_offset_minutes)?;
                if run <= now {
                    return Err(Error::Validation(format!(
                        "scheduled date {date} {} has already passed",
                        request.scheduled_time
                    )));
                }
                Ok(run)
            }
        }
    }
}
