//! LLM Provider Trait
//!
//! Defines the interface the pipeline consumes from the inference backend.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig};
use chat_strategy_core::streaming::UnifiedStreamEvent;

/// Trait that inference backends implement.
///
/// Provides:
/// - Single message completions (`send_message`)
/// - Streaming completions (`stream_message`)
/// - Text embeddings (`embed`)
/// - Health checking
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the default model.
    fn model(&self) -> &str;

    /// Send a message and get a complete response.
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Stream a response, emitting events through `tx` as they arrive.
    ///
    /// Returns the accumulated response once the stream finishes. A stream
    /// interrupted mid-way returns a transport error rather than a partial
    /// response.
    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Embed a text with the given embedding model.
    async fn embed(&self, text: &str, model: &str) -> LlmResult<Vec<f32>>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> LlmResult<()>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;

    /// List available models (if supported by the backend).
    async fn list_models(&self) -> LlmResult<Option<Vec<String>>> {
        Ok(None)
    }
}

/// Classify a backend error from its message text.
///
/// The Ollama SDK surfaces failures as strings; connection problems,
/// missing models and origin rejections each map to a distinct variant.
pub fn classify_backend_error(message: &str, base_url: &str, model: &str) -> LlmError {
    let lower = message.to_lowercase();
    if lower.contains("403") || lower.contains("forbidden") || lower.contains("origin") {
        LlmError::CrossOriginBlocked {
            message: format!("{} refused the request: {}", base_url, message),
        }
    } else if lower.contains("not found") || lower.contains("404") {
        LlmError::ModelNotFound {
            model: model.to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        LlmError::NetworkError {
            message: format!("Request to {} timed out: {}", base_url, message),
        }
    } else if lower.contains("connect") || lower.contains("connection refused") {
        LlmError::ProviderUnavailable {
            message: format!("Cannot connect to {}: {}", base_url, message),
        }
    } else {
        LlmError::NetworkError {
            message: message.to_string(),
        }
    }
}
