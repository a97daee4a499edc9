//! Chat Strategy LLM
//!
//! Unified interface to the inference backend used by the strategy
//! pipeline, with an Ollama implementation (local inference) built on the
//! ollama-rs SDK and the HTTP client factory it uses.

pub mod http_client;
pub mod ollama;
pub mod provider;
pub mod types;

// Re-export main types
pub use http_client::build_http_client;
pub use ollama::OllamaProvider;
pub use provider::{classify_backend_error, LlmProvider};
pub use types::*;
