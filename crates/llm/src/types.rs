//! LLM Types
//!
//! Core types for talking to the inference backend.

use serde::{Deserialize, Serialize};

/// Per-request options for provider behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmRequestOptions {
    /// Use this model instead of the provider's configured one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    /// Ask the backend for its slower deep-reasoning mode.
    #[serde(default)]
    pub deep_reasoning: bool,
    /// Optional temperature override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_override: Option<f32>,
}

impl LlmRequestOptions {
    /// Options targeting a specific model.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model_override: Some(model.into()),
            ..Default::default()
        }
    }

    /// Builder-style switch for deep reasoning.
    pub fn with_deep_reasoning(mut self, enabled: bool) -> Self {
        self.deep_reasoning = enabled;
        self
    }

    /// Builder-style temperature override.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature_override = Some(temperature);
        self
    }
}

/// Configuration for an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend base URL, e.g. `http://localhost:11434`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Default model name
    pub model: String,
    /// Maximum tokens to generate (0 = backend default)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout in seconds. Elapsing it aborts the transport.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "llama3.1".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    /// Create a simple text message
    pub fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(MessageRole::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, text)
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(MessageRole::System, text)
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl UsageStats {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Text content of the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Thinking/reasoning content (if the backend separated it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub usage: UsageStats,
    /// The model that generated the response
    pub model: String,
}

impl LlmResponse {
    /// Convenience constructor for a plain text response.
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Response text, or an empty string when the model produced none.
    pub fn text_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Error types for LLM operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    /// Model not installed / not served by the backend
    ModelNotFound { model: String },
    /// Backend rejected the request origin (Ollama answers 403 for
    /// origins outside `OLLAMA_ORIGINS`)
    CrossOriginBlocked { message: String },
    /// Backend not reachable (e.g. Ollama not running)
    ProviderUnavailable { message: String },
    /// Network/connection error, including interrupted streams
    NetworkError { message: String },
    /// The caller-level timeout elapsed
    Timeout { seconds: u64 },
    /// Server error from the backend
    ServerError {
        message: String,
        status: Option<u16>,
    },
    /// Invalid request (bad parameters)
    InvalidRequest { message: String },
    /// Response parsing error
    ParseError { message: String },
    /// Other error
    Other { message: String },
}

impl LlmError {
    /// The backend could not be reached or the exchange was cut off.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LlmError::CrossOriginBlocked { .. }
                | LlmError::ProviderUnavailable { .. }
                | LlmError::NetworkError { .. }
                | LlmError::Timeout { .. }
        )
    }

    /// Worth another try: transport failures plus 5xx answers from a
    /// reachable backend. Drives the non-streaming fallback.
    pub fn is_recoverable(&self) -> bool {
        self.is_transport() || matches!(self, LlmError::ServerError { .. })
    }

    /// The requested model is missing on the backend. Never retried.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, LlmError::ModelNotFound { .. })
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::ModelNotFound { model } => {
                write!(f, "Model not found: {}", model)
            }
            LlmError::CrossOriginBlocked { message } => {
                write!(f, "Cross-origin request blocked: {}", message)
            }
            LlmError::ProviderUnavailable { message } => {
                write!(f, "Provider unavailable: {}", message)
            }
            LlmError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            LlmError::Timeout { seconds } => {
                write!(f, "Request timed out after {}s", seconds)
            }
            LlmError::ServerError { message, status } => {
                if let Some(s) = status {
                    write!(f, "Server error ({}): {}", s, message)
                } else {
                    write!(f, "Server error: {}", message)
                }
            }
            LlmError::InvalidRequest { message } => {
                write!(f, "Invalid request: {}", message)
            }
            LlmError::ParseError { message } => {
                write!(f, "Parse error: {}", message)
            }
            LlmError::Other { message } => {
                write!(f, "Error: {}", message)
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
