use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use careloop_common::{Error, OutreachChannel};
use careloop_channels::{
    EVENT_TYPE_HEADER, VoiceEvent, WhatsAppEventKind, WhatsAppInbound,
};
use careloop_security::signature;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::outcome;
use crate::state::SharedState;

/// Header carrying the `t=<unix>,v0=<hex>` signature on every inbound
/// webhook, voice and WhatsApp alike (distinct secrets).
pub const SIGNATURE_HEADER: &str = "x-signature";

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Run signature verification for one request. Returns the error response
/// to send when the request must be rejected.
fn check_signature(
    headers: &HeaderMap,
    body: &Bytes,
    secret: Option<&str>,
) -> Option<Response> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let verdict = signature::verify(body, header, secret, Utc::now());
    if verdict.ok {
        return None;
    }

    let reason = verdict
        .reason
        .map(|r| r.as_str())
        .unwrap_or("signature rejected");
    warn!(reason, "webhook rejected");
    let status = StatusCode::from_u16(verdict.status).unwrap_or(StatusCode::UNAUTHORIZED);
    Some(error_body(status, reason))
}

/// POST /webhooks/voice — events from the voice provider after an
/// outbound call. Signature is checked before the body is parsed at all.
pub async fn voice_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) =
        check_signature(&headers, &body, state.config.voice.webhook_secret.as_deref())
    {
        return rejection;
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return error_body(StatusCode::BAD_REQUEST, "invalid JSON body"),
    };

    let event = match VoiceEvent::from_json(&payload) {
        Ok(event) => event,
        Err(e) => return error_body(StatusCode::BAD_REQUEST, e.reason()),
    };

    match event {
        VoiceEvent::PostCallTranscription(data) => {
            match outcome::record_transcription(&state, &data).await {
                Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
                Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason()),
            }
        }
        VoiceEvent::CallInitiationFailure(data) => {
            match outcome::record_failure(&state, &data).await {
                Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
                Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason()),
            }
        }
        // Providers stream many event types we have no use for; answering
        // anything but 200 would make them retry forever.
        VoiceEvent::Unknown { event_type } => {
            info!(event_type, "unhandled voice event acknowledged");
            (StatusCode::OK, Json(json!({ "status": "unhandled" }))).into_response()
        }
    }
}

/// POST /webhooks/whatsapp — inbound patient messages. Unlike the voice
/// webhook, an unrecognized event type here is a contract violation and
/// answers 400.
pub async fn whatsapp_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) = check_signature(
        &headers,
        &body,
        state.config.whatsapp.webhook_secret.as_deref(),
    ) {
        return rejection;
    }

    let kind = match headers
        .get(EVENT_TYPE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(raw) => WhatsAppEventKind::from_header(raw),
        None => return error_body(StatusCode::BAD_REQUEST, "missing event type header"),
    };
    if let WhatsAppEventKind::Unknown(event_type) = kind {
        warn!(event_type, "unhandled whatsapp event type");
        return error_body(StatusCode::BAD_REQUEST, "unhandled event type");
    }

    let inbound: WhatsAppInbound = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(_) => return error_body(StatusCode::BAD_REQUEST, "payload does not match schema"),
    };

    let patient = match state.patients.lock().await.find_by_phone(&inbound.message.from) {
        Ok(Some(patient)) => patient,
        Ok(None) => {
            warn!("whatsapp message from unknown sender");
            return error_body(StatusCode::NOT_FOUND, "unknown sender");
        }
        Err(e) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason()),
    };

    // Resume the patient's open message session or bind a new one to the
    // provider's conversation id.
    let conversation_id = {
        let sessions = state.sessions.lock().await;
        let existing = match sessions.open_session_for_patient(&patient.id, OutreachChannel::Message)
        {
            Ok(existing) => existing,
            Err(e) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason()),
        };
        match existing {
            Some(id) => id,
            None => {
                if let Err(e) = sessions.open_session(
                    &inbound.conversation.id,
                    &patient.id,
                    OutreachChannel::Message,
                    None,
                    Utc::now(),
                ) {
                    return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason());
                }
                inbound.conversation.id.clone()
            }
        }
    };
    if let Err(e) = state.sessions.lock().await.mark_in_progress(&conversation_id) {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason());
    }

    info!(
        patient_id = %patient.id,
        conversation_id = %conversation_id,
        message_id = %inbound.message.id,
        "whatsapp message bound to session"
    );
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "conversation_id": conversation_id })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ToolInvocation {
    pub conversation_id: String,
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// POST /webhooks/tools — tool calls made by the provider-hosted
/// conversational agent mid-conversation. The patient identity comes from
/// the session the conversation id was bound to at call time, never from
/// the request body.
pub async fn tool_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) =
        check_signature(&headers, &body, state.config.voice.webhook_secret.as_deref())
    {
        return rejection;
    }

    let invocation: ToolInvocation = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(_) => return error_body(StatusCode::BAD_REQUEST, "payload does not match schema"),
    };

    let session = match state.sessions.lock().await.get_session(&invocation.conversation_id) {
        Ok(Some(session)) => session,
        Ok(None) => return error_body(StatusCode::NOT_FOUND, "unknown conversation"),
        Err(e) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason()),
    };

    // First tool call moves the session out of 'initiated'.
    if let Err(e) = state
        .sessions
        .lock()
        .await
        .mark_in_progress(&invocation.conversation_id)
    {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason());
    }

    let context = careloop_agents::ToolContext {
        patient_id: session.patient_id,
        conversation_id: invocation.conversation_id,
        channel: session.channel,
    };

    match state
        .tools
        .dispatch(&invocation.tool, &context, invocation.args)
        .await
    {
        Ok(output) => (
            StatusCode::OK,
            Json(json!({
                "content": output.content,
                "is_error": output.is_error,
                "unusual": output.unusual,
            })),
        )
            .into_response(),
        Err(Error::Validation(message)) => error_body(StatusCode::BAD_REQUEST, message),
        Err(Error::Agent(message)) => error_body(StatusCode::BAD_REQUEST, message),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.reason()),
    }
}
