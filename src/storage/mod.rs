//! Storage Layer
//!
//! Data persistence: SQLite knowledge store and the JSON settings file.

pub mod config;
pub mod database;
pub mod knowledge_store;

pub use config::*;
pub use database::*;
pub use knowledge_store::*;
