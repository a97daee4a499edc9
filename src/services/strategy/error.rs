//! Strategy Errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chat_strategy_llm::LlmError;

/// Longest raw response kept in a [`RetryAttempt`].
pub const RAW_RESPONSE_PREVIEW_CHARS: usize = 500;

/// Diagnostics for one failed generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub raw_response: String,
    pub error_description: String,
}

impl RetryAttempt {
    pub fn new(attempt_number: u32, raw_response: &str, error_description: impl Into<String>) -> Self {
        Self {
            attempt_number,
            raw_response: truncate(raw_response, RAW_RESPONSE_PREVIEW_CHARS),
            error_description: error_description.into(),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Error, Debug)]
pub enum StrategyError {
    /// Backend unreachable, refused or timed out after every attempt.
    #[error("Transport error: {0}")]
    Transport(LlmError),

    #[error("Model not available: {model}")]
    ModelUnavailable { model: String },

    /// Every attempt produced output that failed extraction or validation.
    #[error("Response validation failed after {} attempt(s)", attempts.len())]
    Validation { attempts: Vec<RetryAttempt> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any other backend failure that survived the retry budget.
    #[error("Backend error: {0}")]
    Backend(LlmError),
}

impl From<LlmError> for StrategyError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ModelNotFound { model } => StrategyError::ModelUnavailable { model },
            e if e.is_transport() => StrategyError::Transport(e),
            e => StrategyError::Backend(e),
        }
    }
}

pub type StrategyResult<T> = Result<T, StrategyError>;
