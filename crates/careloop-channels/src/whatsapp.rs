use std::time::Duration;

use careloop_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v21.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Kind of an inbound WhatsApp webhook, carried in the `x-event-type`
/// header rather than the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhatsAppEventKind {
    MessageReceived,
    Unknown(String),
}

pub const EVENT_TYPE_HEADER: &str = "x-event-type";

impl WhatsAppEventKind {
    pub fn from_header(raw: &str) -> Self {
        match raw {
            "message.received" => Self::MessageReceived,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Inbound message event body. Required fields are enforced by serde;
/// extra provider fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppInbound {
    pub message: WhatsAppMessage,
    pub conversation: WhatsAppConversation,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMessage {
    pub id: String,
    /// Sender phone number in E.164 form.
    pub from: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConversation {
    pub id: String,
}

/// Client for outbound WhatsApp replies through the messaging provider.
pub struct WhatsAppClient {
    access_token: Option<String>,
    phone_number_id: Option<String>,
    base_url: String,
    client: Client,
}

impl WhatsAppClient {
    pub fn new(access_token: Option<String>, phone_number_id: Option<String>) -> Self {
        Self {
            access_token,
            phone_number_id,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Send a text message to `destination`. Returns the provider's
    /// message id.
    pub async fn send_text(&self, destination: &str, text: &str) -> Result<String> {
        let access_token = self
            .access_token
            .as_deref()
            .ok_or_else(|| Error::Config("whatsapp access_token is not configured".to_string()))?;
        let phone_number_id = self.phone_number_id.as_deref().ok_or_else(|| {
            Error::Config("whatsapp phone_number_id is not configured".to_string())
        })?;

        let url = format!("{}/{}/messages", self.base_url, phone_number_id);
        let body = json!({
            "messaging_product": "whatsapp",
            "to": destination,
            "type": "text",
            "text": { "body": text },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("whatsapp send failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "whatsapp provider returned {status}: {detail}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("invalid whatsapp provider response: {e}")))?;
        let message_id = payload["messages"][0]["id"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        info!(destination, message_id = %message_id, "whatsapp message sent");
        Ok(message_id)
    }
}
