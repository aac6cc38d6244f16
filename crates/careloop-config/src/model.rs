use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub voice: VoiceProviderConfig,
    pub whatsapp: WhatsAppProviderConfig,
    pub outreach: OutreachConfig,
    pub anomaly: AnomalyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3970,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_second: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "careloop.db".to_string(),
        }
    }
}

/// Outbound voice provider (conversational calls) credentials.
///
/// All fields are optional at load time; the call adapter fails fast with a
/// configuration error when one it needs is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProviderConfig {
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    pub phone_number_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: Option<String>,
}

/// WhatsApp business messaging provider credentials. Distinct webhook
/// secret from the voice provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppProviderConfig {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutreachConfig {
    /// How often the firing loop polls for due schedules, in seconds.
    pub poll_interval_secs: u64,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
        }
    }
}

/// Plausibility bounds for the anomaly-confirmation policy. Values outside
/// a range still persist but are flagged for conversational follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub glucose_min_mg_dl: f64,
    pub glucose_max_mg_dl: f64,
    pub sleep_min_hours: f64,
    pub sleep_max_hours: f64,
    pub insulin_min_units: f64,
    pub insulin_max_units: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            glucose_min_mg_dl: 70.0,
            glucose_max_mg_dl: 250.0,
            sleep_min_hours: 3.0,
            sleep_max_hours: 12.0,
            insulin_min_units: 1.0,
            insulin_max_units: 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert_eq!(config.gateway.port, 3970);
        assert_eq!(config.outreach.poll_interval_secs, 30);
        assert!(config.voice.api_key.is_none());
        assert!(config.anomaly.glucose_min_mg_dl < config.anomaly.glucose_max_mg_dl);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [gateway]
            port = 8080

            [voice]
            agent_id = "agent_123"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.voice.agent_id.as_deref(), Some("agent_123"));
        assert_eq!(config.anomaly.sleep_max_hours, 12.0);
    }
}
