//! Tool Dispatch
//!
//! The orchestrator hands model-requested tool calls to a [`ToolDispatcher`].
//! Nothing here executes tools: the default
//! [`ToolRegistry`] only routes calls to handlers registered by the host
//! application and reports every other tool as unavailable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

// ============================================================================
// Trait Definitions
// ============================================================================

/// Name and description of a tool, as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A single callable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Identity and description of this tool.
    fn descriptor(&self) -> ToolDescriptor;

    /// Run the tool and return the user-visible result text.
    async fn call(&self, params: &HashMap<String, Value>) -> CoreResult<String>;
}

/// Routes a tool call requested by the model.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Tools the model may request, in a stable order.
    fn available_tools(&self) -> Vec<ToolDescriptor>;

    /// Dispatch a call. Returns the user-visible result text.
    async fn dispatch(&self, name: &str, params: &HashMap<String, Value>) -> CoreResult<String>;
}

// ============================================================================
// ToolRegistry
// ============================================================================

/// Name-keyed registry of [`ToolHandler`]s with insertion-ordered listing.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Replaces any existing handler with the same name.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.descriptor().name;
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn available_tools(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|handler| handler.descriptor())
            .collect()
    }

    async fn dispatch(&self, name: &str, params: &HashMap<String, Value>) -> CoreResult<String> {
        match self.tools.get(name) {
            Some(handler) => handler.call(params).await,
            None => Err(CoreError::not_found(format!("Tool not found: {}", name))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
