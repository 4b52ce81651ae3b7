//! Error types for the levelling engine

use thiserror::Error;

use crate::session::SessionHandle;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while driving the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Handle does not refer to a live session (detached or never issued)
    #[error("Unknown session: {0}")]
    UnknownSession(SessionHandle),

    /// Gain sink rejected a request
    #[error("Gain sink error: {0}")]
    Sink(#[from] SinkError),

    /// Settings JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a [`GainSink`](crate::GainSink)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Output path is suspended and needs a resume
    #[error("Audio output is suspended")]
    Suspended,

    /// Output path has been torn down
    #[error("Audio output is closed")]
    Closed,

    /// Backend-specific failure
    #[error("Audio backend error: {0}")]
    Backend(String),
}
