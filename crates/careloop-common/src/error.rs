use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the outreach agent layer.
///
/// `Auth` and `Validation` are boundary errors: webhook handlers translate
/// them into 401/400 and they never reach business logic. `Config` and
/// `Provider` propagate to the caller of the outbound adapter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication error: {0}")]
    Auth(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Reason string without the variant prefix, for wire responses.
    pub fn reason(&self) -> String {
        match self {
            Error::Auth(r)
            | Error::Validation(r)
            | Error::Config(r)
            | Error::Provider(r)
            | Error::Database(r)
            | Error::Channel(r)
            | Error::Agent(r) => r.clone(),
            Error::Io(e) => e.to_string(),
            Error::Serialization(e) => e.to_string(),
        }
    }
}
