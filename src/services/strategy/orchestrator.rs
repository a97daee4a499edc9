//! Strategy Orchestrator
//!
//! Runs one conversation turn end to end:
//!
//! 1. validate the input
//! 2. connect (backend health check)
//! 3. extract the intent
//! 4. decide the reasoning mode
//! 5. retrieve knowledge context
//! 6. build the prompt
//! 7. call the model with retries
//! 8. dispatch a tool call or finalize the reply
//!
//! Failures after step 1 never surface as errors: they become an
//! assistant-authored reply explaining what went wrong.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use chat_strategy_core::{ToolDescriptor, ToolDispatcher, ToolRegistry};
use chat_strategy_llm::{LlmProvider, LlmRequestOptions, Message};

use super::call_handler::{CallOutcome, CallRequest, LlmCallHandler, RetryPolicy};
use super::error::{StrategyError, StrategyResult};
use super::intent::{last_user_text, IntentExtractor};
use super::reasoning::{ReasoningDecision, ReasoningSelector};
use super::response::RESPONSE_FORMAT_INSTRUCTIONS;
use super::tracker::{NoopObserver, StatusObserver, TaskStatusTracker};
use crate::models::conversation::{Actor, ContentBlock, ConversationTurn, TurnContent};
use crate::models::settings::AppConfig;
use crate::models::status::{PipelineStage, StrategyStatus};
use crate::services::knowledge::retrieval::{
    format_context_block, RetrievalConfig, RetrievalEngine, RetrievalResult,
};
use crate::storage::knowledge_store::KnowledgeStore;

const BASE_SYSTEM_PROMPT: &str = "You are a helpful assistant embedded in a chat application. \
Answer accurately and concisely. When knowledge base context is provided, prefer it over \
general knowledge and say so when it does not cover the question.";

const DEEP_REASONING_NOTE: &str = "_This answer was produced with deep reasoning enabled._";

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Backend connection details plus what the orchestrator has learned about
/// the backend so far.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub host: String,
    pub generation_model: String,
    pub intermediate_model: String,
    pub embedding_model: String,
    pub request_timeout: Duration,
    /// Last generation model that produced a valid reply.
    pub last_known_good_model: Option<String>,
    /// Result of the latest health check; `None` before the first one.
    pub available: Option<bool>,
}

impl BackendConfig {
    pub fn from_settings(settings: &AppConfig) -> Self {
        Self {
            host: settings.backend_host.clone(),
            generation_model: settings.generation_model.clone(),
            intermediate_model: settings.intermediate_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            last_known_good_model: None,
            available: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Turn request / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub chat_id: String,
    /// Knowledge base to search; `None` skips retrieval.
    pub project_id: Option<String>,
    /// Full history, ending with the user message to answer.
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn: ConversationTurn,
    pub intent: String,
    pub reasoning: ReasoningDecision,
    pub retrieval: RetrievalResult,
    /// Final tracker snapshot.
    pub status: StrategyStatus,
}

// ---------------------------------------------------------------------------
// StrategyOrchestrator
// ---------------------------------------------------------------------------

pub struct StrategyOrchestrator {
    provider: Arc<dyn LlmProvider>,
    store: Option<Arc<dyn KnowledgeStore>>,
    tools: Arc<dyn ToolDispatcher>,
    observer: Arc<dyn StatusObserver>,
    settings: AppConfig,
    backend: BackendConfig,
    retry_policy: RetryPolicy,
}

impl StrategyOrchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: AppConfig) -> Self {
        let backend = BackendConfig::from_settings(&settings);
        let retry_policy = RetryPolicy::default().with_stream_timeout(backend.request_timeout);
        Self {
            provider,
            store: None,
            tools: Arc::new(ToolRegistry::new()),
            observer: Arc::new(NoopObserver),
            settings,
            backend,
            retry_policy,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolDispatcher>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn settings(&self) -> &AppConfig {
        &self.settings
    }

    /// Run one turn. Only malformed input is returned as an error.
    pub async fn run_turn(&mut self, request: TurnRequest) -> StrategyResult<TurnOutcome> {
        let user_text = validate_request(&request)?;
        let mut tracker = TaskStatusTracker::new(self.observer.clone());
        let chat_id = request.chat_id.clone();

        info!(chat_id = %chat_id, turns = request.history.len(), "orchestrator: turn started");

        // Connect
        tracker.start(
            PipelineStage::Connect,
            format!("Connecting to {}", self.backend.host),
        );
        if let Err(e) = self.provider.health_check().await {
            warn!(host = %self.backend.host, error = %e, "orchestrator: backend unreachable");
            self.backend.available = Some(false);
            tracker.fail(PipelineStage::Connect, format!("Backend unreachable: {}", e));
            let turn = self.error_turn(&chat_id, &StrategyError::from(e));
            return Ok(TurnOutcome {
                turn,
                intent: user_text,
                reasoning: ReasoningDecision::inactive(),
                retrieval: RetrievalResult::default(),
                status: tracker.snapshot(),
            });
        }
        self.backend.available = Some(true);
        tracker.complete(PipelineStage::Connect, "Backend reachable");

        // Intent
        let intent = IntentExtractor::new(self.provider.clone(), &self.backend.intermediate_model)
            .extract(&request.history, &mut tracker)
            .await;

        // Reasoning mode
        let reasoning = ReasoningSelector::new(self.provider.clone(), &self.backend.intermediate_model)
            .enabled(self.settings.deep_reasoning_enabled)
            .decide(&intent, &mut tracker)
            .await;

        // Retrieval
        let retrieval = match (&self.store, request.project_id.as_deref()) {
            (Some(store), Some(project_id)) => {
                RetrievalEngine::new(
                    self.provider.clone(),
                    store.clone(),
                    RetrievalConfig::from_settings(&self.settings),
                )
                .retrieve(&intent, project_id, &mut tracker)
                .await
            }
            _ => {
                tracker.complete(PipelineStage::Retrieve, "Skipped (no knowledge base)");
                RetrievalResult::default()
            }
        };

        // Prompt
        let system = build_system_prompt(
            &intent,
            &self.tools.available_tools(),
            &format_context_block(&retrieval.chunks),
        );
        let call = CallRequest {
            messages: history_to_messages(&request.history),
            system: Some(system),
            options: LlmRequestOptions::for_model(&self.backend.generation_model)
                .with_deep_reasoning(reasoning.activate),
        };

        let handler = LlmCallHandler::with_policy(self.provider.clone(), self.retry_policy.clone());
        let turn = match handler.call(&call, &mut tracker).await {
            Ok(outcome) => {
                self.backend.last_known_good_model = Some(self.backend.generation_model.clone());
                self.finalize(&chat_id, outcome, &reasoning).await
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "orchestrator: generation failed");
                if matches!(e, StrategyError::Transport(_)) {
                    self.backend.available = Some(false);
                }
                self.error_turn(&chat_id, &e)
            }
        };

        info!(chat_id = %chat_id, actor = %turn.actor, "orchestrator: turn finished");
        Ok(TurnOutcome {
            turn,
            intent,
            reasoning,
            retrieval,
            status: tracker.snapshot(),
        })
    }

    async fn finalize(
        &self,
        chat_id: &str,
        outcome: CallOutcome,
        reasoning: &ReasoningDecision,
    ) -> ConversationTurn {
        let actor = outcome.response.actor;
        match outcome.response.content {
            TurnContent::ToolCall {
                name,
                params,
                display,
            } => {
                let result = match self.tools.dispatch(&name, &params).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(tool = %name, error = %e, "orchestrator: tool dispatch failed");
                        format!("{}\n\nThe tool could not run: {}", display, e)
                    }
                };
                ConversationTurn::new(
                    chat_id,
                    Actor::Tool,
                    TurnContent::ToolCall {
                        name,
                        params,
                        display: result,
                    },
                )
            }
            TurnContent::Formatted { mut blocks } => {
                if reasoning.activate && self.settings.annotate_deep_reasoning {
                    blocks.push(ContentBlock::markdown(DEEP_REASONING_NOTE));
                }
                ConversationTurn::new(chat_id, actor, TurnContent::Formatted { blocks })
            }
        }
    }

    fn error_turn(&self, chat_id: &str, err: &StrategyError) -> ConversationTurn {
        let text = match err {
            StrategyError::Transport(e) => format!(
                "I could not reach the inference backend at {} ({}). \
                 Check that Ollama is running and accepts requests from this application, then try again.",
                self.backend.host, e
            ),
            StrategyError::ModelUnavailable { model } => {
                let mut text = format!(
                    "The model `{}` is not available on the backend. Install it with `ollama pull {}`.",
                    model, model
                );
                if let Some(good) = self
                    .backend
                    .last_known_good_model
                    .as_deref()
                    .filter(|good| *good != model)
                {
                    text.push_str(&format!(" The last model that worked was `{}`.", good));
                }
                text
            }
            StrategyError::Validation { attempts } => {
                let mut text = format!(
                    "I could not produce a well-formed answer after {} attempt(s):\n",
                    attempts.len()
                );
                for attempt in attempts {
                    text.push_str(&format!(
                        "\n- Attempt {}: {}",
                        attempt.attempt_number, attempt.error_description
                    ));
                }
                text.push_str("\n\nPlease rephrase the question or try again.");
                text
            }
            StrategyError::Backend(e) => format!("The backend returned an error: {}", e),
            StrategyError::InvalidInput(msg) => format!("I could not process this message: {}", msg),
        };
        ConversationTurn::new(chat_id, Actor::Llm, TurnContent::markdown(text))
    }
}

fn validate_request(request: &TurnRequest) -> StrategyResult<String> {
    if request.chat_id.trim().is_empty() {
        return Err(StrategyError::InvalidInput("chat id is empty".to_string()));
    }
    match request.history.last() {
        None => Err(StrategyError::InvalidInput("history is empty".to_string())),
        Some(turn) if turn.actor != Actor::User => Err(StrategyError::InvalidInput(
            "the last turn must come from the user".to_string(),
        )),
        Some(_) => last_user_text(&request.history)
            .ok_or_else(|| StrategyError::InvalidInput("the user message is empty".to_string())),
    }
}

fn history_to_messages(history: &[ConversationTurn]) -> Vec<Message> {
    history
        .iter()
        .map(|turn| {
            let text = turn.content.to_plain_text();
            match turn.actor {
                Actor::User => Message::user(text),
                Actor::Llm | Actor::Agent => Message::assistant(text),
                Actor::Tool => Message::user(format!("Tool result: {}", text)),
            }
        })
        .collect()
}

/// System prompt: role, interpreted request, tools, knowledge context and
/// the response format.
pub fn build_system_prompt(intent: &str, tools: &[ToolDescriptor], context_block: &str) -> String {
    let mut prompt = String::from(BASE_SYSTEM_PROMPT);

    prompt.push_str("\n\n## Interpreted request\n\n");
    prompt.push_str(intent);

    prompt.push_str("\n\n## Available tools\n\n");
    if tools.is_empty() {
        prompt.push_str("None. Always answer with formatted content.");
    } else {
        for tool in tools {
            prompt.push_str(&format!("- `{}`: {}\n", tool.name, tool.description));
        }
    }

    if !context_block.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(context_block.trim_end());
    }

    prompt.push_str("\n\n## Response format\n\n");
    prompt.push_str(RESPONSE_FORMAT_INSTRUCTIONS);
    prompt
}
