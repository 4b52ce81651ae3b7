/// Simulator error types
use autovolume_core::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for SimError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
