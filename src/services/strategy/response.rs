//! Structured Response Schema
//!
//! The model is asked to answer with a single JSON object:
//!
//! ```json
//! {"actor": "llm", "content": {"type": "formatted", "blocks": [{"type": "markdown", "text": "..."}]}}
//! {"actor": "agent", "content": {"type": "toolCall", "name": "...", "params": {}, "display": "..."}}
//! ```
//!
//! This module owns that contract: the prompt text describing it and the
//! extraction + validation applied to every raw reply.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::json_extractor::{extract_json_object, ExtractionError};
use crate::models::conversation::{Actor, TurnContent};

/// Schema description appended to the generation system prompt.
pub const RESPONSE_FORMAT_INSTRUCTIONS: &str = r#"Respond with ONE JSON object and nothing else. Use exactly this shape:

{"actor": "llm", "content": {"type": "formatted", "blocks": [{"type": "markdown", "text": "<answer in markdown>"}]}}

Blocks may also be code: {"type": "code", "language": "<language>", "text": "<code>"}.
Use at least one block. Keep the blocks in reading order.

To call a tool instead of answering, use:

{"actor": "agent", "content": {"type": "toolCall", "name": "<tool name>", "params": {<arguments>}, "display": "<one sentence telling the user what you are doing>"}}

Only call tools listed under "Available tools". Never wrap the JSON in markdown fences."#;

/// A validated model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub actor: Actor,
    pub content: TurnContent,
}

/// Why a raw reply was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("schema validation failed: {0}")]
    Schema(String),
}

/// Extract, parse and validate a raw reply.
pub fn parse_structured_response(raw: &str) -> Result<StructuredResponse, ResponseError> {
    let json = extract_json_object(raw)?;
    validate_object(json)
}

/// Parse and validate an already extracted JSON object.
pub fn validate_object(json: &str) -> Result<StructuredResponse, ResponseError> {
    let response: StructuredResponse =
        serde_json::from_str(json).map_err(|e| ResponseError::Schema(e.to_string()))?;
    validate(&response).map_err(ResponseError::Schema)?;
    Ok(response)
}

fn validate(response: &StructuredResponse) -> Result<(), String> {
    if !matches!(response.actor, Actor::Llm | Actor::Agent) {
        return Err(format!(
            "actor must be \"llm\" or \"agent\", got \"{}\"",
            response.actor
        ));
    }

    match &response.content {
        TurnContent::Formatted { blocks } => {
            if blocks.is_empty() {
                return Err("formatted content needs at least one block".to_string());
            }
            if let Some(i) = blocks.iter().position(|b| b.text().trim().is_empty()) {
                return Err(format!("block {} is empty", i));
            }
        }
        TurnContent::ToolCall { name, display, .. } => {
            if name.trim().is_empty() {
                return Err("toolCall.name must not be empty".to_string());
            }
            if display.trim().is_empty() {
                return Err("toolCall.display must not be empty".to_string());
            }
        }
    }

    Ok(())
}
