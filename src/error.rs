//! Error types for the TrichMind engine

use thiserror::Error;

/// Errors that can occur inside the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A remote service explicitly reported failure (`ok: false`, HTTP error)
    #[error("Service error: {0}")]
    Service(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Every model input still holds its zero/"unknown" default
    #[error("Refusing to predict on an empty feature form: {0}")]
    TrivialPayload(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Date parse error: {0}")]
    DateParse(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    /// Whether the error is worth showing to the user as-is.
    ///
    /// Service and validation failures carry messages written for humans;
    /// everything else is plumbing and should be reported generically.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            EngineError::Service(_) | EngineError::Validation(_) | EngineError::TrivialPayload(_)
        )
    }
}
