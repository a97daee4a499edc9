//! Integration Tests Module
//!
//! Integration tests for the chat strategy pipeline. Every test runs
//! against a scripted inference backend and in-memory SQLite.


// Call handler, reasoning selector and intent extraction tests
mod strategy_test;

// Chunking, indexing and retrieval tests
mod knowledge_test;

// End-to-end orchestrator turn tests
mod orchestrator_test;
