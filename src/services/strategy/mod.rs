//! Chat Strategy Pipeline
//!
//! Everything that happens between a user message and the reply turn:
//! - `tracker`: stage statuses pushed to an observer
//! - `stream_analyzer`: early signals from a partially streamed response
//! - `json_extractor` / `response`: isolating and validating the reply
//! - `call_handler`: streaming generation with bounded retries
//! - `intent` / `reasoning`: request rewriting and deep-reasoning selection
//! - `orchestrator`: the turn pipeline tying it together

pub mod call_handler;
pub mod error;
pub mod intent;
pub mod json_extractor;
pub mod orchestrator;
pub mod reasoning;
pub mod response;
pub mod stream_analyzer;
pub mod tracker;

pub use call_handler::{CallOutcome, CallRequest, LlmCallHandler, RetryPolicy, MAX_RETRIES};
pub use error::{RetryAttempt, StrategyError, StrategyResult};
pub use intent::IntentExtractor;
pub use json_extractor::{extract_json_object, ExtractionError};
pub use orchestrator::{BackendConfig, StrategyOrchestrator, TurnOutcome, TurnRequest};
pub use reasoning::{DecisionSource, KeywordScore, ReasoningDecision, ReasoningSelector};
pub use response::{parse_structured_response, ResponseError, StructuredResponse};
pub use stream_analyzer::{AnalyzerUpdate, StreamAnalyzer};
pub use tracker::{
    ChannelObserver, LogObserver, NoopObserver, RecordingObserver, StatusObserver,
    TaskStatusTracker,
};
