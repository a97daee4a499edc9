//! Intent Extraction
//!
//! Turns the conversation history into one standalone request used for
//! retrieval and reasoning selection.

use std::sync::Arc;

use tracing::{debug, warn};

use chat_strategy_llm::{LlmProvider, LlmRequestOptions, Message};

use super::tracker::TaskStatusTracker;
use crate::models::conversation::{Actor, ConversationTurn};
use crate::models::status::PipelineStage;

/// Turns of history shown to the model.
const HISTORY_WINDOW: usize = 10;

const INTENT_SYSTEM_PROMPT: &str = "Rewrite the user's latest message as one self-contained request, \
resolving references to earlier turns. Reply with the rewritten request only, no preamble.";

/// Text of the most recent user turn, if any.
pub fn last_user_text(history: &[ConversationTurn]) -> Option<String> {
    history
        .iter()
        .rev()
        .find(|t| t.actor == Actor::User)
        .map(|t| t.content.to_plain_text())
        .filter(|t| !t.trim().is_empty())
}

pub struct IntentExtractor {
    provider: Arc<dyn LlmProvider>,
    intermediate_model: String,
}

impl IntentExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, intermediate_model: impl Into<String>) -> Self {
        Self {
            provider,
            intermediate_model: intermediate_model.into(),
        }
    }

    /// Standalone request for the latest user turn. A one-turn history is
    /// returned as is; otherwise the intermediate model rewrites it and the
    /// raw user text is used if that fails.
    pub async fn extract(&self, history: &[ConversationTurn], tracker: &mut TaskStatusTracker) -> String {
        tracker.start(PipelineStage::ExtractIntent, "Reading the conversation");
        let fallback = last_user_text(history).unwrap_or_default();

        if history.len() <= 1 {
            tracker.complete(PipelineStage::ExtractIntent, "Single message, no rewrite needed");
            return fallback;
        }

        let transcript = history
            .iter()
            .skip(history.len().saturating_sub(HISTORY_WINDOW))
            .map(|t| format!("{}: {}", t.actor, t.content.to_plain_text()))
            .collect::<Vec<_>>()
            .join("\n");

        let result = self
            .provider
            .send_message(
                vec![Message::user(transcript)],
                Some(INTENT_SYSTEM_PROMPT.to_string()),
                LlmRequestOptions::for_model(&self.intermediate_model).with_temperature(0.0),
            )
            .await;

        match result {
            Ok(response) if !response.text_or_empty().trim().is_empty() => {
                let intent = response.text_or_empty().trim().to_string();
                debug!(intent = %intent, "intent: rewritten request");
                tracker.complete(PipelineStage::ExtractIntent, "Request understood");
                intent
            }
            Ok(_) => {
                warn!("intent: empty rewrite, using the last user message");
                tracker.fail(PipelineStage::ExtractIntent, "Empty rewrite, using the last message");
                fallback
            }
            Err(e) => {
                warn!(error = %e, "intent: rewrite failed, using the last user message");
                tracker.fail(
                    PipelineStage::ExtractIntent,
                    format!("Rewrite failed ({}), using the last message", e),
                );
                fallback
            }
        }
    }
}
