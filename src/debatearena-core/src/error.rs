//! Error types for the debate engine.
//!
//! Running out of quota is not an error; see
//! [`DebateOutcome`](crate::orchestrator::DebateOutcome).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Generation service error: {0}")]
    GenerationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Account store error: {0}")]
    StoreError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
