//! LLM Call Handler
//!
//! Runs one structured generation with bounded retries. Each attempt walks
//! an explicit state machine:
//!
//! ```text
//! Generating -> Extracting -> Validating -> Succeeded
//!      |             |             |
//!      +-------------+-------------+----> Retrying -> Generating
//!                                   \---> Failed
//! ```
//!
//! Malformed output is retried immediately. Backend failures are retried
//! with a linear backoff, except a missing model which fails at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chat_strategy_core::streaming::UnifiedStreamEvent;
use chat_strategy_llm::{LlmError, LlmProvider, LlmRequestOptions, LlmResult, Message};

use super::error::{RetryAttempt, StrategyError, StrategyResult};
use super::json_extractor::extract_json_object;
use super::response::{validate_object, StructuredResponse};
use super::stream_analyzer::{AnalyzerUpdate, StreamAnalyzer};
use super::tracker::TaskStatusTracker;
use crate::models::status::PipelineStage;

/// Maximum number of generation attempts per call.
pub const MAX_RETRIES: u32 = 3;

const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff_base * n`.
    pub backoff_base: Duration,
    /// Upper bound for one streaming call.
    pub stream_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            backoff_base: Duration::from_millis(1000),
            stream_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

/// Prompt for one structured generation.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub options: LlmRequestOptions,
}

/// Result of a successful call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub response: StructuredResponse,
    /// Raw text the response was parsed from.
    pub raw_text: String,
    pub thinking: Option<String>,
    /// Number of the attempt that succeeded (1-based).
    pub attempt: u32,
    /// Diagnostics of the attempts that failed before it.
    pub failed_attempts: Vec<RetryAttempt>,
}

/// Text produced by one generation step.
#[derive(Debug)]
struct Generation {
    text: String,
    thinking: Option<String>,
}

enum CallState {
    Generating { attempt: u32 },
    Extracting { attempt: u32, generation: Generation },
    Validating { attempt: u32, json: String, generation: Generation },
    Retrying { next_attempt: u32, delay: Option<Duration> },
    Succeeded(CallOutcome),
    Failed(StrategyError),
}

pub struct LlmCallHandler {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl LlmCallHandler {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_policy(provider, RetryPolicy::default())
    }

    pub fn with_policy(provider: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate, extract and validate, retrying within the policy.
    pub async fn call(
        &self,
        request: &CallRequest,
        tracker: &mut TaskStatusTracker,
    ) -> StrategyResult<CallOutcome> {
        let max = self.policy.max_attempts.max(1);
        let mut failed: Vec<RetryAttempt> = Vec::new();
        let mut state = CallState::Generating { attempt: 1 };

        loop {
            state = match state {
                CallState::Generating { attempt } => {
                    tracker.set_retry_info(attempt, max);
                    tracker.start(PipelineStage::AnalyzeRequest, "Waiting for the response type");
                    tracker.start(PipelineStage::IdentifyActor, "Waiting for the responder");
                    tracker.reset_stream_signals();
                    tracker.start(
                        PipelineStage::Generate,
                        format!("Generating response (attempt {}/{})", attempt, max),
                    );
                    match self.generate(request, tracker).await {
                        Ok(generation) => {
                            tracker.complete(PipelineStage::Generate, "Response received");
                            CallState::Extracting {
                                attempt,
                                generation,
                            }
                        }
                        Err(err) => self.on_backend_error(err, attempt, max, &mut failed, tracker),
                    }
                }

                CallState::Extracting {
                    attempt,
                    generation,
                } => {
                    tracker.start(PipelineStage::Validate, "Extracting JSON from response");
                    let extracted = extract_json_object(&generation.text).map(str::to_string);
                    match extracted {
                        Ok(json) => CallState::Validating {
                            attempt,
                            json,
                            generation,
                        },
                        Err(e) => self.on_invalid_output(
                            attempt,
                            max,
                            &generation.text,
                            e.to_string(),
                            &mut failed,
                            tracker,
                        ),
                    }
                }

                CallState::Validating {
                    attempt,
                    json,
                    generation,
                } => {
                    tracker.update(PipelineStage::Validate, "Checking response schema");
                    match validate_object(&json) {
                        Ok(response) => {
                            tracker.complete(PipelineStage::Validate, "Response validated");
                            CallState::Succeeded(CallOutcome {
                                response,
                                raw_text: generation.text,
                                thinking: generation.thinking,
                                attempt,
                                failed_attempts: std::mem::take(&mut failed),
                            })
                        }
                        Err(e) => self.on_invalid_output(
                            attempt,
                            max,
                            &generation.text,
                            e.to_string(),
                            &mut failed,
                            tracker,
                        ),
                    }
                }

                CallState::Retrying {
                    next_attempt,
                    delay,
                } => {
                    if let Some(delay) = delay {
                        debug!(delay_ms = delay.as_millis() as u64, "call_handler: backing off");
                        tokio::time::sleep(delay).await;
                    }
                    CallState::Generating {
                        attempt: next_attempt,
                    }
                }

                CallState::Succeeded(outcome) => {
                    info!(attempt = outcome.attempt, "call_handler: structured response accepted");
                    return Ok(outcome);
                }

                CallState::Failed(err) => return Err(err),
            };
        }
    }

    /// Stream one response, falling back to a blocking call on a
    /// recoverable failure. Every text increment goes through a fresh analyzer.
    async fn generate(
        &self,
        request: &CallRequest,
        tracker: &mut TaskStatusTracker,
    ) -> LlmResult<Generation> {
        let mut analyzer = StreamAnalyzer::new();
        let (tx, mut rx) = mpsc::channel::<UnifiedStreamEvent>(STREAM_CHANNEL_CAPACITY);

        let stream = self.provider.stream_message(
            request.messages.clone(),
            request.system.clone(),
            tx,
            request.options.clone(),
        );
        let consume = async {
            while let Some(event) = rx.recv().await {
                if let Some(text) = event.text() {
                    let update = analyzer.push(text);
                    apply_update(tracker, update);
                }
            }
        };

        let timeout = self.policy.stream_timeout;
        let streamed = match tokio::time::timeout(timeout, async {
            let (result, ()) = tokio::join!(stream, consume);
            result
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                seconds: timeout.as_secs(),
            }),
        };

        match streamed {
            Ok(response) => {
                // Some backends only return the assembled text.
                if analyzer.text().is_empty() {
                    let update = analyzer.push(response.text_or_empty());
                    apply_update(tracker, update);
                }
                Ok(Generation {
                    text: analyzer.text().to_string(),
                    thinking: response.thinking,
                })
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "call_handler: streaming failed, falling back to a blocking call");
                tracker.update(
                    PipelineStage::Generate,
                    "Streaming interrupted, retrying without streaming",
                );
                let response = self
                    .provider
                    .send_message(
                        request.messages.clone(),
                        request.system.clone(),
                        request.options.clone(),
                    )
                    .await?;
                let mut analyzer = StreamAnalyzer::new();
                let update = analyzer.push(response.text_or_empty());
                apply_update(tracker, update);
                Ok(Generation {
                    text: analyzer.text().to_string(),
                    thinking: response.thinking,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn on_backend_error(
        &self,
        err: LlmError,
        attempt: u32,
        max: u32,
        failed: &mut Vec<RetryAttempt>,
        tracker: &mut TaskStatusTracker,
    ) -> CallState {
        if err.is_model_unavailable() {
            tracker.fail(PipelineStage::Generate, err.to_string());
            return CallState::Failed(err.into());
        }

        if attempt >= max {
            warn!(attempt, error = %err, "call_handler: backend failure on final attempt");
            tracker.fail(
                PipelineStage::Generate,
                format!("{} (attempt {}/{})", err, attempt, max),
            );
            return CallState::Failed(err.into());
        }

        let delay = self.policy.backoff_for(attempt);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "call_handler: backend failure, will retry"
        );
        failed.push(RetryAttempt::new(attempt, "", err.to_string()));
        tracker.fail(
            PipelineStage::Generate,
            format!("{} (attempt {}/{}), retrying", err, attempt, max),
        );
        CallState::Retrying {
            next_attempt: attempt + 1,
            delay: Some(delay),
        }
    }

    fn on_invalid_output(
        &self,
        attempt: u32,
        max: u32,
        raw: &str,
        description: String,
        failed: &mut Vec<RetryAttempt>,
        tracker: &mut TaskStatusTracker,
    ) -> CallState {
        warn!(attempt, error = %description, "call_handler: invalid structured response");
        tracker.fail(
            PipelineStage::Validate,
            format!("Invalid response (attempt {}/{}): {}", attempt, max, description),
        );
        failed.push(RetryAttempt::new(attempt, raw, description));

        if attempt >= max {
            CallState::Failed(StrategyError::Validation {
                attempts: std::mem::take(failed),
            })
        } else {
            CallState::Retrying {
                next_attempt: attempt + 1,
                delay: None,
            }
        }
    }
}

fn apply_update(tracker: &mut TaskStatusTracker, update: AnalyzerUpdate) {
    if update.is_empty() {
        return;
    }
    if let Some(actor) = update.actor {
        let message = format!("Responder: {}", actor);
        tracker.set_actor(actor);
        tracker.complete(PipelineStage::IdentifyActor, message);
    }
    if let Some(kind) = update.kind {
        tracker.set_response_kind(kind);
        tracker.complete(PipelineStage::AnalyzeRequest, format!("Response type: {}", kind));
    }
    if let Some(name) = update.tool_name {
        tracker.set_tool_name(name);
    }
    if let Some(progress) = update.progress {
        tracker.set_streaming_progress(progress);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
