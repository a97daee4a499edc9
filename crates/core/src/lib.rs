//! Chat Strategy Core
//!
//! Foundational types shared across the chat-strategy workspace. This crate
//! has no dependency on application-level code (database, LLM providers).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `streaming` - Unified stream event types
//! - `tool_trait` - Tool dispatch abstraction (`ToolDispatcher`, `ToolRegistry`)

pub mod error;
pub mod streaming;
pub mod tool_trait;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::UnifiedStreamEvent;

// ── Tool Dispatch ──────────────────────────────────────────────────────
pub use tool_trait::{ToolDescriptor, ToolDispatcher, ToolHandler, ToolRegistry};
