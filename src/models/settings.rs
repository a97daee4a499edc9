//! Settings Models
//!
//! Application configuration and settings data structures.

use serde::{Deserialize, Serialize};

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inference backend URL
    pub backend_host: String,
    /// Model used for the main structured response
    pub generation_model: String,
    /// Model used for embeddings (indexing and retrieval)
    pub embedding_model: String,
    /// Lightweight model for intent extraction and the reasoning judgment
    pub intermediate_model: String,
    /// Minimum cosine similarity for a chunk to be retrieved, in [0, 1]
    pub similarity_threshold: f32,
    /// Maximum number of retrieved chunks
    pub retrieval_top_k: usize,
    /// Per-request timeout for backend calls
    pub request_timeout_secs: u64,
    /// Allow the deep reasoning mode at all
    pub deep_reasoning_enabled: bool,
    /// Add a note to replies produced with deep reasoning
    #[serde(default = "default_true")]
    pub annotate_deep_reasoning: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_host: "http://localhost:11434".to_string(),
            generation_model: "llama3.1".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            intermediate_model: "llama3.2".to_string(),
            similarity_threshold: 0.70,
            retrieval_top_k: 5,
            request_timeout_secs: 120,
            deep_reasoning_enabled: true,
            annotate_deep_reasoning: true,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub backend_host: Option<String>,
    pub generation_model: Option<String>,
    pub embedding_model: Option<String>,
    pub intermediate_model: Option<String>,
    pub similarity_threshold: Option<f32>,
    pub retrieval_top_k: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub deep_reasoning_enabled: Option<bool>,
    pub annotate_deep_reasoning: Option<bool>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(host) = update.backend_host {
            self.backend_host = host;
        }
        if let Some(model) = update.generation_model {
            self.generation_model = model;
        }
        if let Some(model) = update.embedding_model {
            self.embedding_model = model;
        }
        if let Some(model) = update.intermediate_model {
            self.intermediate_model = model;
        }
        if let Some(threshold) = update.similarity_threshold {
            self.similarity_threshold = threshold;
        }
        if let Some(top_k) = update.retrieval_top_k {
            self.retrieval_top_k = top_k;
        }
        if let Some(timeout) = update.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if let Some(enabled) = update.deep_reasoning_enabled {
            self.deep_reasoning_enabled = enabled;
        }
        if let Some(annotate) = update.annotate_deep_reasoning {
            self.annotate_deep_reasoning = annotate;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if url::Url::parse(&self.backend_host).is_err() {
            return Err(format!("Invalid backend host: {}", self.backend_host));
        }

        for (field, value) in [
            ("generation_model", &self.generation_model),
            ("embedding_model", &self.embedding_model),
            ("intermediate_model", &self.intermediate_model),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", field));
            }
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(format!(
                "similarity_threshold must be between 0 and 1, got {}",
                self.similarity_threshold
            ));
        }

        if self.retrieval_top_k == 0 {
            return Err("retrieval_top_k must be at least 1".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1 second".to_string());
        }

        Ok(())
    }
}
