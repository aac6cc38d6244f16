pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AnomalyConfig, AppConfig, DatabaseConfig, GatewayConfig, OutreachConfig, RateLimitConfig,
    VoiceProviderConfig, WhatsAppProviderConfig,
};
