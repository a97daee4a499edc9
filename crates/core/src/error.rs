//! Core Error Types
//!
//! Foundational error type shared by the workspace crates. Only depends on
//! thiserror + std so the core crate stays lightweight; the application
//! crate layers storage and backend variants on top.

use thiserror::Error;

/// Errors raised by tool dispatch.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No tool registered under the requested name
    #[error("Not found: {0}")]
    NotFound(String),

    /// The tool ran and failed
    #[error("Tool error: {0}")]
    Tool(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a tool dispatch error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }
}

impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
