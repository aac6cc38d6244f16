use std::time::Duration;

use careloop_common::{Category, Error, OutreachChannel, Result};
use careloop_db::OutreachSchedule;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::state::{AppState, SharedState};

/// Background poller for due outreach schedules.
pub fn spawn_firing_loop(state: SharedState) -> JoinHandle<()> {
    let poll_interval = Duration::from_secs(state.config.outreach.poll_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match fire_due(&state, Utc::now()).await {
                Ok(0) => {}
                Ok(fired) => info!(fired, "outreach pass complete"),
                Err(e) => warn!(error = %e, "outreach pass failed"),
            }
        }
    })
}

/// Fire every due schedule once. Each schedule is claimed before any
/// provider call, so a second poller racing this one skips it. Returns
/// the number of firings attempted.
pub async fn fire_due(state: &AppState, now: DateTime<Utc>) -> Result<usize> {
    let due = state.scheduler.due(now).await?;
    let mut fired = 0;

    for schedule in due {
        if !state.scheduler.on_fired(&schedule, now).await? {
            continue;
        }
        fired += 1;
        if let Err(e) = fire_one(state, &schedule, now).await {
            warn!(
                schedule_id = %schedule.id,
                patient_id = %schedule.patient_id,
                error = %e,
                "outreach firing failed"
            );
        }
    }
    Ok(fired)
}

async fn fire_one(state: &AppState, schedule: &OutreachSchedule, now: DateTime<Utc>) -> Result<()> {
    let patient = state
        .patients
        .lock()
        .await
        .get_patient(&schedule.patient_id)?
        .ok_or_else(|| Error::Validation(format!("unknown patient: {}", schedule.patient_id)))?;
    // A schedule-level override wins over the profile number.
    let phone = schedule
        .phone_override
        .clone()
        .or_else(|| patient.phone.clone())
        .ok_or_else(|| Error::Validation(format!("patient {} has no phone", patient.id)))?;

    let variables = state.context.build_context_at(&schedule.patient_id, now).await?;

    let attempt = match schedule.channel {
        OutreachChannel::Call => state.voice.initiate_call(&phone, &variables).await,
        OutreachChannel::Message => {
            let text = outreach_message(&patient.name, schedule.category);
            state.whatsapp.send_text(&phone, &text).await
        }
    };

    match attempt {
        Ok(conversation_id) => {
            state.sessions.lock().await.open_session(
                &conversation_id,
                &schedule.patient_id,
                schedule.channel,
                Some(&schedule.id),
                now,
            )?;
            info!(
                schedule_id = %schedule.id,
                conversation_id = %conversation_id,
                channel = %schedule.channel,
                "outreach delivered"
            );
            Ok(())
        }
        Err(e) => {
            // The provider never issued a conversation id, so the failed
            // attempt gets a synthetic one to stay visible as a session.
            let conversation_id = format!("failed-{}", uuid::Uuid::new_v4());
            let sessions = state.sessions.lock().await;
            sessions.open_session(
                &conversation_id,
                &schedule.patient_id,
                schedule.channel,
                Some(&schedule.id),
                now,
            )?;
            sessions.fail(&conversation_id, &e.reason())?;
            Err(e)
        }
    }
}

fn outreach_message(patient_name: &str, category: Category) -> String {
    match category {
        Category::Glucometry => format!(
            "Hi {patient_name}, time for your glucose check-in. What was your latest reading?"
        ),
        Category::Insulin => format!(
            "Hi {patient_name}, quick check: have you taken your insulin today? Reply with the dose and type."
        ),
        Category::Wellness => format!(
            "Hi {patient_name}, how are you feeling today? How did you sleep?"
        ),
        Category::General => format!("Hi {patient_name}, just checking in. How are things going?"),
    }
}
