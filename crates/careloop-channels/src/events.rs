use careloop_common::{Error, Result};
use serde::Deserialize;

/// Webhook events delivered by the voice provider after an outbound call.
/// Parsed from the body's `type` discriminant; unrecognized types land in
/// `Unknown` so the webhook can acknowledge them instead of erroring.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    PostCallTranscription(CallTranscription),
    CallInitiationFailure(CallFailure),
    Unknown { event_type: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallTranscription {
    pub conversation_id: String,
    pub call_duration_secs: Option<u64>,
    pub transcript_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallFailure {
    pub conversation_id: String,
    pub reason: Option<String>,
}

impl VoiceEvent {
    /// Parse a webhook body. Known types require `data.conversation_id`;
    /// a missing `type` field is malformed.
    pub fn from_json(body: &serde_json::Value) -> Result<Self> {
        let event_type = body["type"]
            .as_str()
            .ok_or_else(|| Error::Validation("webhook body missing 'type' field".to_string()))?;

        match event_type {
            "post_call_transcription" => {
                let data: CallTranscription = serde_json::from_value(body["data"].clone())
                    .map_err(|e| {
                        Error::Validation(format!("invalid post_call_transcription data: {e}"))
                    })?;
                Ok(Self::PostCallTranscription(data))
            }
            "call_initiation_failure" => {
                let data: CallFailure =
                    serde_json::from_value(body["data"].clone()).map_err(|e| {
                        Error::Validation(format!("invalid call_initiation_failure data: {e}"))
                    })?;
                Ok(Self::CallInitiationFailure(data))
            }
            other => Ok(Self::Unknown {
                event_type: other.to_string(),
            }),
        }
    }
}
