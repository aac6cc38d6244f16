use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use careloop_common::{Error, PatientId, ScheduleId};
use careloop_db::OutreachSchedule;
use careloop_outreach::NewSchedule;
use chrono::Utc;
use serde_json::json;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;
use crate::webhooks;

/// Build the application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    // Per-IP rate limit from config (default: 1 req/sec, burst 60).
    let rl = &state.config.gateway.rate_limit;
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(rl.per_second)
        .burst_size(rl.burst_size)
        .finish()
        .expect("governor config should be valid");
    let governor_limiter = governor_conf.limiter().clone();
    let governor_layer = GovernorLayer::new(governor_conf);

    // Clean up rate-limiter state for inactive IPs.
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            governor_limiter.retain_recent();
        }
    });

    Router::new()
        .route("/health", get(health))
        .route("/webhooks/voice", post(webhooks::voice_webhook))
        .route("/webhooks/whatsapp", post(webhooks::whatsapp_webhook))
        .route("/webhooks/tools", post(webhooks::tool_webhook))
        .route(
            "/api/patients/{id}/schedules",
            get(list_schedules).post(create_schedule),
        )
        .route(
            "/api/schedules/{id}",
            put(update_schedule).delete(delete_schedule),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(governor_layer)
}

async fn health() -> &'static str {
    "ok"
}

fn schedule_json(schedule: &OutreachSchedule) -> serde_json::Value {
    json!({
        "id": schedule.id,
        "patient_id": schedule.patient_id,
        "channel": schedule.channel,
        "category": schedule.category,
        "frequency": schedule.frequency,
        "scheduled_time": schedule.scheduled_time,
        "explicit_date": schedule.explicit_date,
        "phone_override": schedule.phone_override,
        "is_active": schedule.is_active,
        "next_run": schedule.next_run.to_rfc3339(),
    })
}

fn error_response(err: Error) -> Response {
    let status = match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.reason() }))).into_response()
}

/// POST /api/patients/{id}/schedules
async fn create_schedule(
    State(state): State<SharedState>,
    Path(patient_id): Path<String>,
    Json(request): Json<NewSchedule>,
) -> Response {
    match state
        .scheduler
        .create(&PatientId(patient_id), request, Utc::now())
        .await
    {
        Ok(schedule) => {
            (StatusCode::CREATED, Json(schedule_json(&schedule))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /api/patients/{id}/schedules
async fn list_schedules(
    State(state): State<SharedState>,
    Path(patient_id): Path<String>,
) -> Response {
    match state.scheduler.list_for_patient(&PatientId(patient_id)).await {
        Ok(schedules) => {
            let body: Vec<serde_json::Value> = schedules.iter().map(schedule_json).collect();
            (StatusCode::OK, Json(json!({ "schedules": body }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// PUT /api/schedules/{id}
async fn update_schedule(
    State(state): State<SharedState>,
    Path(schedule_id): Path<String>,
    Json(request): Json<NewSchedule>,
) -> Response {
    match state
        .scheduler
        .update(&ScheduleId(schedule_id), request, Utc::now())
        .await
    {
        Ok(schedule) => (StatusCode::OK, Json(schedule_json(&schedule))).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/schedules/{id}
async fn delete_schedule(
    State(state): State<SharedState>,
    Path(schedule_id): Path<String>,
) -> Response {
    match state.scheduler.delete(&ScheduleId(schedule_id)).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "status": "deleted" }))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown schedule" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
