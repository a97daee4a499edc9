//! Pipeline Status Models
//!
//! Snapshot types broadcast to the status observer during a turn.

use serde::{Deserialize, Serialize};

use super::conversation::ResponseKind;

/// Fixed, ordered stages of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Connect,
    ExtractIntent,
    DecideReasoning,
    Retrieve,
    AnalyzeRequest,
    IdentifyActor,
    Generate,
    Validate,
}

impl PipelineStage {
    /// All stages in pipeline order.
    pub const ALL: [PipelineStage; 8] = [
        PipelineStage::Connect,
        PipelineStage::ExtractIntent,
        PipelineStage::DecideReasoning,
        PipelineStage::Retrieve,
        PipelineStage::AnalyzeRequest,
        PipelineStage::IdentifyActor,
        PipelineStage::Generate,
        PipelineStage::Validate,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            PipelineStage::Connect => "connect",
            PipelineStage::ExtractIntent => "extract-intent",
            PipelineStage::DecideReasoning => "decide-reasoning",
            PipelineStage::Retrieve => "retrieve",
            PipelineStage::AnalyzeRequest => "analyze-request",
            PipelineStage::IdentifyActor => "identify-actor",
            PipelineStage::Generate => "generate",
            PipelineStage::Validate => "validate",
        }
    }

    /// Human-readable stage name.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Connect => "Connecting to backend",
            PipelineStage::ExtractIntent => "Understanding the request",
            PipelineStage::DecideReasoning => "Choosing reasoning mode",
            PipelineStage::Retrieve => "Searching the knowledge base",
            PipelineStage::AnalyzeRequest => "Analyzing response type",
            PipelineStage::IdentifyActor => "Identifying responder",
            PipelineStage::Generate => "Generating response",
            PipelineStage::Validate => "Validating response",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Error,
}

/// One stage's state within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub id: PipelineStage,
    pub name: String,
    pub status: TaskStatus,
    pub message: String,
}

impl PipelineTask {
    pub fn new(stage: PipelineStage) -> Self {
        Self {
            id: stage,
            name: stage.label().to_string(),
            status: TaskStatus::Todo,
            message: String::new(),
        }
    }
}

/// Immutable snapshot delivered to the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStatus {
    pub tasks: Vec<PipelineTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_kind: Option<ResponseKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_progress: Option<u8>,
    pub deep_reasoning: bool,
}

impl StrategyStatus {
    pub fn task(&self, stage: PipelineStage) -> Option<&PipelineTask> {
        self.tasks.iter().find(|t| t.id == stage)
    }
}
