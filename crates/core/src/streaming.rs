//! Unified Stream Event Types
//!
//! Provider-agnostic events sent from an LLM provider to whoever consumes a
//! streaming response. Shared by the llm crate (producers) and the main
//! crate (the call handler).

use serde::{Deserialize, Serialize};

/// Streaming event emitted by a provider while a response is generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedStreamEvent {
    /// Text content delta from the model
    TextDelta { content: String },

    /// Start of a thinking/reasoning block
    ThinkingStart,

    /// Thinking content delta
    ThinkingDelta { content: String },

    /// End of a thinking/reasoning block
    ThinkingEnd,

    /// Token usage information
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },

    /// Error during streaming
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream complete
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

impl UnifiedStreamEvent {
    /// Visible text carried by this event, if any.
    ///
    /// Thinking deltas are excluded: only answer text is part
    /// of the structured response.
    pub fn text(&self) -> Option<&str> {
        match self {
            UnifiedStreamEvent::TextDelta { content } => Some(content.as_str()),
            _ => None,
        }
    }
}
