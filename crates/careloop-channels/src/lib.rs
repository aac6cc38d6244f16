//! Channel adapters: outbound voice calls and WhatsApp messaging, plus the
//! typed inbound webhook payloads each provider delivers.

pub mod events;
pub mod voice;
pub mod whatsapp;

pub use events::{CallFailure, CallTranscription, VoiceEvent};
pub use voice::VoiceClient;
pub use whatsapp::{
    EVENT_TYPE_HEADER, WhatsAppClient, WhatsAppConversation, WhatsAppEventKind, WhatsAppInbound,
    WhatsAppMessage,
};
