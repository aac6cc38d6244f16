use careloop_channels::{CallFailure, CallTranscription};
use careloop_common::Result;
use tracing::{debug, info};

use crate::state::AppState;

/// Record a completed call. Idempotent by conversation id: the provider
/// redelivers webhooks, and only the first delivery changes the session.
pub async fn record_transcription(state: &AppState, data: &CallTranscription) -> Result<bool> {
    let duration = data.call_duration_secs.unwrap_or(0) as i64;
    let applied = state
        .sessions
        .lock()
        .await
        .complete(&data.conversation_id, duration)?;

    if applied {
        info!(
            conversation_id = %data.conversation_id,
            duration_secs = duration,
            "call completed"
        );
    } else {
        debug!(
            conversation_id = %data.conversation_id,
            "transcription for unknown or already-terminal session ignored"
        );
    }
    Ok(applied)
}

/// Record a call that the provider could not place. Same idempotency
/// contract as [`record_transcription`].
pub async fn record_failure(state: &AppState, data: &CallFailure) -> Result<bool> {
    let reason = data.reason.as_deref().unwrap_or("unknown");
    let applied = state
        .sessions
        .lock()
        .await
        .fail(&data.conversation_id, reason)?;

    if applied {
        info!(
            conversation_id = %data.conversation_id,
            reason,
            "call initiation failed"
        );
    } else {
        debug!(
            conversation_id = %data.conversation_id,
            "failure for unknown or already-terminal session ignored"
        );
    }
    Ok(applied)
}
