//! Conversation Models
//!
//! A conversation is an ordered list of immutable [`ConversationTurn`]s.
//! Turn content is either formatted text (markdown and code blocks) or a
//! tool call requested by the model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Party that authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    User,
    Llm,
    Agent,
    Tool,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::User => write!(f, "user"),
            Actor::Llm => write!(f, "llm"),
            Actor::Agent => write!(f, "agent"),
            Actor::Tool => write!(f, "tool"),
        }
    }
}

/// One block of formatted content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Markdown {
        text: String,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        text: String,
    },
}

impl ContentBlock {
    pub fn markdown(text: impl Into<String>) -> Self {
        ContentBlock::Markdown { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            ContentBlock::Markdown { text } | ContentBlock::Code { text, .. } => text,
        }
    }

    /// Render as markdown (code blocks fenced).
    pub fn to_markdown(&self) -> String {
        match self {
            ContentBlock::Markdown { text } => text.clone(),
            ContentBlock::Code { language, text } => format!(
                "```{}\n{}\n```",
                language.as_deref().unwrap_or(""),
                text
            ),
        }
    }
}

/// Content of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TurnContent {
    /// Ordered formatted blocks (at least one)
    Formatted { blocks: Vec<ContentBlock> },
    /// A tool invocation with a user-visible description
    ToolCall {
        name: String,
        #[serde(default)]
        params: HashMap<String, Value>,
        display: String,
    },
}

impl TurnContent {
    /// Single markdown block.
    pub fn markdown(text: impl Into<String>) -> Self {
        TurnContent::Formatted {
            blocks: vec![ContentBlock::markdown(text)],
        }
    }

    /// Plain-text rendering used when the turn is replayed to the model.
    pub fn to_plain_text(&self) -> String {
        match self {
            TurnContent::Formatted { blocks } => blocks
                .iter()
                .map(ContentBlock::to_markdown)
                .collect::<Vec<_>>()
                .join("\n\n"),
            TurnContent::ToolCall { name, display, .. } => {
                format!("[tool {}] {}", name, display)
            }
        }
    }

    pub fn kind(&self) -> ResponseKind {
        match self {
            TurnContent::Formatted { .. } => ResponseKind::Formatted,
            TurnContent::ToolCall { .. } => ResponseKind::ToolCall,
        }
    }
}

/// Discriminant of [`TurnContent`], as named in the structured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseKind {
    Formatted,
    ToolCall,
}

impl ResponseKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "formatted" => Some(ResponseKind::Formatted),
            "toolCall" => Some(ResponseKind::ToolCall),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseKind::Formatted => write!(f, "formatted"),
            ResponseKind::ToolCall => write!(f, "toolCall"),
        }
    }
}

/// One immutable turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: String,
    pub actor: Actor,
    pub content: TurnContent,
    pub timestamp: DateTime<Utc>,
    pub chat_id: String,
}

impl ConversationTurn {
    /// Create a turn stamped now with a fresh id.
    pub fn new(chat_id: impl Into<String>, actor: Actor, content: TurnContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor,
            content,
            timestamp: Utc::now(),
            chat_id: chat_id.into(),
        }
    }

    /// Convenience constructor for a user message.
    pub fn user(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(chat_id, Actor::User, TurnContent::markdown(text))
    }
}
