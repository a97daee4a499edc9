//! Error Handling
//!
//! Error type for storage, settings and knowledge operations. The strategy
//! pipeline has its own `StrategyError`; this one covers everything that
//! touches disk, SQLite or the embedding endpoint.

use chat_strategy_llm::LlmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Pool or query failures reported with context
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Missing or unreadable settings, unresolvable paths
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inference backend failure (chat or embeddings)
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    /// The backend answered, but the embedding is unusable
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Rejected settings or knowledge input
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the failure came from the inference backend rather than
    /// local storage.
    pub fn is_backend(&self) -> bool {
        matches!(self, AppError::Backend(_) | AppError::Embedding(_))
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
