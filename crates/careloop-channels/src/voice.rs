use std::collections::BTreeMap;
use std::time::Duration;

use careloop_common::{Error, Result};
use reqwest::Client;
use serde_json::json;
use tracing::info;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the conversational voice provider. Places outbound calls
/// that connect the patient to the configured voice agent.
pub struct VoiceClient {
    api_key: Option<String>,
    agent_id: Option<String>,
    phone_number_id: Option<String>,
    base_url: String,
    client: Client,
}

impl VoiceClient {
    pub fn new(
        api_key: Option<String>,
        agent_id: Option<String>,
        phone_number_id: Option<String>,
    ) -> Self {
        Self {
            api_key,
            agent_id,
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

    fn credentials(&self) -> Result<(&str, &str, &str)> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("voice api_key is not configured".to_string()))?;
        let agent_id = self
            .agent_id
            .as_deref()
            .ok_or_else(|| Error::Config("voice agent_id is not configured".to_string()))?;
        let phone_number_id = self.phone_number_id.as_deref().ok_or_else(|| {
            Error::Config("voice phone_number_id is not configured".to_string())
        })?;
        Ok((api_key, agent_id, phone_number_id))
    }

    /// Place an outbound call to `destination`, priming the voice agent
    /// with the given dynamic variables. Returns the provider's
    /// conversation id, the key every later webhook is correlated by.
    pub async fn initiate_call(
        &self,
        destination: &str,
        dynamic_variables: &BTreeMap<String, String>,
    ) -> Result<String> {
        // Credential check happens before any network I/O.
        let (api_key, agent_id, phone_number_id) = self.credentials()?;

        if destination.trim().is_empty() {
            return Err(Error::Provider(
                "cannot place call: destination phone number is empty".to_string(),
            ));
        }

        let url = format!("{}/v1/convai/twilio/outbound-call", self.base_url);
        let body = json!({
            "agent_id": agent_id,
            "agent_phone_number_id": phone_number_id,
            "to_number": destination,
            "conversation_initiation_client_data": {
                "dynamic_variables": dynamic_variables,
            },
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("voice call request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "voice provider returned {status}: {detail}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("invalid voice provider response: {e}")))?;
        let conversation_id = payload["conversation_id"]
            .as_str()
            .ok_or_else(|| {
                Error::Provider("voice provider response missing conversation_id".to_string())
            })?
            .to_string();

        info!(conversation_id = %conversation_id, "outbound call accepted");
        Ok(conversation_id)
    }
}
