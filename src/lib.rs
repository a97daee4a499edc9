//! Chat Strategy
//!
//! LLM orchestration pipeline for chat turns:
//! - `services::strategy`: intent, reasoning mode, structured generation
//!   with retries, status tracking
//! - `services::knowledge`: markdown chunking, indexing and retrieval
//! - `storage`: SQLite knowledge store and JSON settings
//! - `models` / `utils`: shared data types, errors and paths

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::settings::{AppConfig, SettingsUpdate};
pub use services::strategy::{StrategyOrchestrator, TurnOutcome, TurnRequest};
pub use utils::error::{AppError, AppResult};
