//! Ollama Provider
//!
//! Implementation of the LlmProvider trait for a local Ollama server using
//! the ollama-rs native SDK. Covers blocking chat, streaming chat, deep
//! reasoning (`think`) and embeddings.

use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::{ChatMessage, ChatMessageResponse, MessageRole as OllamaRole};
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::generation::parameters::ThinkType;
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::http_client::build_http_client;
use crate::provider::{classify_backend_error, LlmProvider};
use crate::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig,
    UsageStats,
};
use chat_strategy_core::streaming::UnifiedStreamEvent;

/// Default Ollama API endpoint
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Ollama provider for local inference using the native ollama-rs SDK
pub struct OllamaProvider {
    config: ProviderConfig,
    client: Ollama,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given configuration.
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        let timeout = if config.request_timeout_secs > 0 {
            Some(Duration::from_secs(config.request_timeout_secs))
        } else {
            None
        };
        let client = Self::create_client(&base_url, timeout)?;
        Ok(Self { config, client })
    }

    /// Create an Ollama SDK client from a base URL string.
    ///
    /// `Ollama::new_with_client` takes host and port separately, so the URL
    /// is split here. The injected reqwest client carries the timeout.
    fn create_client(base_url: &str, timeout: Option<Duration>) -> LlmResult<Ollama> {
        let parsed = url::Url::parse(base_url).map_err(|e| LlmError::InvalidRequest {
            message: format!("Invalid backend URL '{}': {}", base_url, e),
        })?;
        let host = parsed.host_str().unwrap_or("localhost");
        let port = parsed.port().unwrap_or(11434);
        let host_url = format!("{}://{}", parsed.scheme(), host);
        let http_client = build_http_client(timeout)?;
        Ok(Ollama::new_with_client(host_url, port, http_client))
    }

    /// Get the base URL for the Ollama server (used in error messages)
    pub fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
    }

    fn resolve_model(&self, options: &LlmRequestOptions) -> String {
        options
            .model_override
            .clone()
            .unwrap_or_else(|| self.config.model.clone())
    }

    fn map_error(&self, message: String, model: &str) -> LlmError {
        classify_backend_error(&message, self.base_url(), model)
    }

    /// Build a ChatMessageRequest from our unified types
    fn build_chat_request(
        &self,
        messages: &[Message],
        system: Option<&str>,
        request_options: &LlmRequestOptions,
    ) -> ChatMessageRequest {
        let mut chat_messages: Vec<ChatMessage> = Vec::with_capacity(messages.len() + 1);
        if let Some(sys) = system {
            chat_messages.push(ChatMessage::system(sys.to_string()));
        }
        chat_messages.extend(messages.iter().map(convert_message));

        let mut request = ChatMessageRequest::new(self.resolve_model(request_options), chat_messages);

        let temperature = request_options
            .temperature_override
            .unwrap_or(self.config.temperature);
        let mut opts = ModelOptions::default().temperature(temperature);
        if self.config.max_tokens > 0 {
            opts = opts.num_predict(self.config.max_tokens as i32);
        }
        request = request.options(opts);

        if request_options.deep_reasoning {
            request = request.think(ThinkType::True);
        }

        request
    }

    /// Convert a non-streaming SDK response to our unified LlmResponse.
    fn convert_response(&self, response: &ChatMessageResponse) -> LlmResponse {
        let msg = &response.message;
        let usage = response
            .final_data
            .as_ref()
            .map(|data| UsageStats {
                input_tokens: data.prompt_eval_count as u32,
                output_tokens: data.eval_count as u32,
            })
            .unwrap_or_default();

        LlmResponse {
            content: non_empty(&msg.content),
            thinking: msg.thinking.as_deref().and_then(non_empty),
            usage,
            model: response.model.clone(),
        }
    }
}

fn convert_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        MessageRole::User => OllamaRole::User,
        MessageRole::Assistant => OllamaRole::Assistant,
        MessageRole::System => OllamaRole::System,
    };
    ChatMessage::new(role, message.content.clone())
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let model = self.resolve_model(&request_options);
        let request = self.build_chat_request(&messages, system.as_deref(), &request_options);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| self.map_error(e.to_string(), &model))?;

        Ok(self.convert_response(&response))
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let model = self.resolve_model(&request_options);
        let request = self.build_chat_request(&messages, system.as_deref(), &request_options);

        let mut stream = self
            .client
            .send_chat_messages_stream(request)
            .await
            .map_err(|e| self.map_error(e.to_string(), &model))?;

        let mut accumulated_content = String::new();
        let mut accumulated_thinking = String::new();
        let mut usage = UsageStats::default();
        let mut in_thinking = false;
        let mut response_model = model.clone();

        while let Some(chunk_result) = stream.next().await {
            let response = match chunk_result {
                Ok(response) => response,
                Err(_) => {
                    let message = format!("Stream from {} was interrupted", self.base_url());
                    let _ = tx
                        .send(UnifiedStreamEvent::Error {
                            message: message.clone(),
                            code: None,
                        })
                        .await;
                    return Err(LlmError::NetworkError { message });
                }
            };
            response_model = response.model.clone();
            let msg = &response.message;

            if let Some(thinking) = msg.thinking.as_deref().filter(|t| !t.is_empty()) {
                if !in_thinking {
                    in_thinking = true;
                    let _ = tx.send(UnifiedStreamEvent::ThinkingStart).await;
                }
                accumulated_thinking.push_str(thinking);
                let _ = tx
                    .send(UnifiedStreamEvent::ThinkingDelta {
                        content: thinking.to_string(),
                    })
                    .await;
            }

            if !msg.content.is_empty() {
                if in_thinking {
                    in_thinking = false;
                    let _ = tx.send(UnifiedStreamEvent::ThinkingEnd).await;
                }
                accumulated_content.push_str(&msg.content);
                let _ = tx
                    .send(UnifiedStreamEvent::TextDelta {
                        content: msg.content.clone(),
                    })
                    .await;
            }

            if response.done {
                if in_thinking {
                    in_thinking = false;
                    let _ = tx.send(UnifiedStreamEvent::ThinkingEnd).await;
                }
                if let Some(final_data) = &response.final_data {
                    usage = UsageStats {
                        input_tokens: final_data.prompt_eval_count as u32,
                        output_tokens: final_data.eval_count as u32,
                    };
                    let _ = tx
                        .send(UnifiedStreamEvent::Usage {
                            input_tokens: usage.input_tokens,
                            output_tokens: usage.output_tokens,
                        })
                        .await;
                }
                let _ = tx
                    .send(UnifiedStreamEvent::Complete {
                        stop_reason: Some("end_turn".to_string()),
                    })
                    .await;
            }
        }

        debug!(
            model = %response_model,
            chars = accumulated_content.len(),
            thinking_chars = accumulated_thinking.len(),
            "ollama: stream finished"
        );

        Ok(LlmResponse {
            content: non_empty(&accumulated_content),
            thinking: non_empty(&accumulated_thinking),
            usage,
            model: response_model,
        })
    }

    async fn embed(&self, text: &str, model: &str) -> LlmResult<Vec<f32>> {
        let request = GenerateEmbeddingsRequest::new(model.to_string(), EmbeddingsInput::from(text));
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| self.map_error(e.to_string(), model))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError {
                message: format!("Backend returned no embedding for model {}", model),
            })
    }

    async fn health_check(&self) -> LlmResult<()> {
        self.client
            .list_local_models()
            .await
            .map_err(|e| self.map_error(e.to_string(), &self.config.model))?;
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn list_models(&self) -> LlmResult<Option<Vec<String>>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| self.map_error(e.to_string(), &self.config.model))?;

        Ok(Some(models.into_iter().map(|m| m.name).collect()))
    }
}
