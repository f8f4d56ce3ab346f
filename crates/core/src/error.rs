//! Error types for the Mesa pipeline and CLI.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, LLM providers, index build and
//! persistence, corpus access, and serialization.

use thiserror::Error;

/// Unified error type for the Mesa workspace.
///
/// All fallible functions in the application return `Result<T, AppError>`.
/// We never panic in library code; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors, including request timeouts
    #[error("LLM error: {0}")]
    Llm(String),

    /// Index build and persistence errors
    #[error("Index error: {0}")]
    Index(String),

    /// Corpus access errors
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
