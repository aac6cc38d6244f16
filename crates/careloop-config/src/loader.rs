use std::path::Path;

use careloop_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Loads configuration from a TOML file, then applies environment variable
/// overrides for secrets so credentials never have to live on disk.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            info!("loading config from {}", path.display());
            toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?
        } else {
            debug!("config file {} not found, using defaults", path.display());
            AppConfig::default()
        };

        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        let overrides: [(&str, &mut Option<String>); 7] = [
            ("CARELOOP_VOICE_API_KEY", &mut config.voice.api_key),
            ("CARELOOP_VOICE_AGENT_ID", &mut config.voice.agent_id),
            (
                "CARELOOP_VOICE_PHONE_NUMBER_ID",
                &mut config.voice.phone_number_id,
            ),
            (
                "CARELOOP_VOICE_WEBHOOK_SECRET",
                &mut config.voice.webhook_secret,
            ),
            (
                "CARELOOP_WHATSAPP_ACCESS_TOKEN",
                &mut config.whatsapp.access_token,
            ),
            (
                "CARELOOP_WHATSAPP_PHONE_NUMBER_ID",
                &mut config.whatsapp.phone_number_id,
            ),
            (
                "CARELOOP_WHATSAPP_WEBHOOK_SECRET",
                &mut config.whatsapp.webhook_secret,
            ),
        ];

        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var)
                && !value.is_empty()
            {
                *slot = Some(value);
            }
        }

        if let Ok(path) = std::env::var("CARELOOP_DB_PATH")
            && !path.is_empty()
        {
            config.database.path = path;
        }
    }
}
