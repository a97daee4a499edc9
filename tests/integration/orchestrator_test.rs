//! Strategy Orchestrator Integration Tests
//!
//! Full turns against the scripted backend: the happy path, deep
//! reasoning, retrieval, tool dispatch and every failure narrated as a
//! reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use chat_strategy::models::conversation::{Actor, ContentBlock, ConversationTurn, TurnContent};
use chat_strategy::models::knowledge::{KnowledgeChunk, KnowledgeItem};
use chat_strategy::models::settings::AppConfig;
use chat_strategy::models::status::{PipelineStage, TaskStatus};
use chat_strategy::services::strategy::{
    RecordingObserver, RetryPolicy, StrategyError, StrategyOrchestrator, TurnRequest,
};
use chat_strategy::storage::Database;
use chat_strategy_core::{CoreResult, ToolDescriptor, ToolHandler, ToolRegistry};
use chat_strategy_llm::LlmError;

use super::support::{text, MockProvider, VALID_FORMATTED};

const FRENCH_PROOF: &str = "explique-moi cette preuve mathématique étape par étape";

fn orchestrator(provider: Arc<MockProvider>) -> (StrategyOrchestrator, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    let orchestrator = StrategyOrchestrator::new(provider, AppConfig::default())
        .with_observer(observer.clone())
        .with_retry_policy(RetryPolicy {
            backoff_base: Duration::from_millis(1),
            ..RetryPolicy::default()
        });
    (orchestrator, observer)
}

fn ask(message: &str) -> TurnRequest {
    TurnRequest {
        chat_id: "chat-1".to_string(),
        project_id: None,
        history: vec![ConversationTurn::user("chat-1", message)],
    }
}

fn reply_text(turn: &ConversationTurn) -> String {
    turn.content.to_plain_text()
}

struct SearchDocs;

#[async_trait]
impl ToolHandler for SearchDocs {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("search_docs", "Search the product documentation")
    }

    async fn call(&self, params: &HashMap<String, Value>) -> CoreResult<String> {
        let query = params.get("query").and_then(|v| v.as_str()).unwrap_or("");
        Ok(format!("2 results for '{}'", query))
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_plain_question_produces_formatted_reply() {
    let provider = Arc::new(MockProvider::new().with_streams(vec![text(VALID_FORMATTED)]));
    let (mut orchestrator, observer) = orchestrator(provider.clone());

    let outcome = orchestrator
        .run_turn(ask("How do I install demo?"))
        .await
        .unwrap();

    assert_eq!(outcome.turn.actor, Actor::Llm);
    assert_eq!(outcome.turn.chat_id, "chat-1");
    assert_eq!(reply_text(&outcome.turn), "Run `cargo install demo`.");
    assert!(!outcome.reasoning.activate);
    // Single turn, no keywords: only the generation call reaches the backend.
    assert_eq!(provider.chat_calls(), 0);
    assert_eq!(provider.stream_calls().len(), 1);

    for stage in PipelineStage::ALL {
        assert_eq!(
            outcome.status.task(stage).map(|t| t.status),
            Some(TaskStatus::Completed),
            "stage {}",
            stage
        );
    }
    assert_eq!(
        outcome.status.task(PipelineStage::Retrieve).unwrap().message,
        "Skipped (no knowledge base)"
    );
    assert_eq!(
        observer.transitions(PipelineStage::Connect),
        vec![TaskStatus::InProgress, TaskStatus::Completed]
    );
    assert_eq!(orchestrator.backend().available, Some(true));
    assert_eq!(
        orchestrator.backend().last_known_good_model.as_deref(),
        Some("llama3.1")
    );
}

#[tokio::test]
async fn test_deep_reasoning_is_requested_and_annotated() {
    let provider = Arc::new(
        MockProvider::new()
            .with_chat(vec![text(r#"{"activate": true, "reason": "proof"}"#)])
            .with_streams(vec![text(VALID_FORMATTED)]),
    );
    let (mut orchestrator, _observer) = orchestrator(provider.clone());

    let outcome = orchestrator.run_turn(ask(FRENCH_PROOF)).await.unwrap();

    assert!(outcome.reasoning.activate);
    assert!(outcome.status.deep_reasoning);
    let calls = provider.stream_calls();
    assert!(calls[0].options.deep_reasoning);
    assert_eq!(calls[0].options.model_override.as_deref(), Some("llama3.1"));

    match &outcome.turn.content {
        TurnContent::Formatted { blocks } => {
            assert_eq!(blocks.len(), 2);
            assert!(matches!(&blocks[1], ContentBlock::Markdown { text } if text.contains("deep reasoning")));
        }
        other => panic!("unexpected content {:?}", other),
    }
}

#[tokio::test]
async fn test_annotation_can_be_switched_off() {
    let provider = Arc::new(
        MockProvider::new()
            .with_chat(vec![text(r#"{"activate": true, "reason": "proof"}"#)])
            .with_streams(vec![text(VALID_FORMATTED)]),
    );
    let settings = AppConfig {
        annotate_deep_reasoning: false,
        ..AppConfig::default()
    };
    let mut orchestrator = StrategyOrchestrator::new(provider, settings);

    let outcome = orchestrator.run_turn(ask(FRENCH_PROOF)).await.unwrap();

    assert!(outcome.reasoning.activate);
    assert_eq!(reply_text(&outcome.turn), "Run `cargo install demo`.");
}

#[tokio::test]
async fn test_multi_turn_history_uses_rewritten_intent() {
    let provider = Arc::new(
        MockProvider::new()
            .with_chat(vec![text("How do I install demo on Linux?")])
            .with_streams(vec![text(VALID_FORMATTED)]),
    );
    let (mut orchestrator, _observer) = orchestrator(provider.clone());

    let request = TurnRequest {
        chat_id: "chat-1".to_string(),
        project_id: None,
        history: vec![
            ConversationTurn::user("chat-1", "How do I install demo?"),
            ConversationTurn::new("chat-1", Actor::Llm, TurnContent::markdown("Which OS?")),
            ConversationTurn::user("chat-1", "Linux"),
        ],
    };
    let outcome = orchestrator.run_turn(request).await.unwrap();

    assert_eq!(outcome.intent, "How do I install demo on Linux?");
    let call = &provider.stream_calls()[0];
    assert_eq!(call.messages.len(), 3);
    assert!(call
        .system
        .as_deref()
        .unwrap_or_default()
        .contains("How do I install demo on Linux?"));
}

// ============================================================================
// Retrieval
// ============================================================================

#[tokio::test]
async fn test_retrieved_context_reaches_the_prompt() {
    let question = "How do I install demo?";
    let db = Database::new_in_memory().unwrap();
    db.upsert_knowledge_item(&KnowledgeItem {
        id: "guide".to_string(),
        project_id: "docs".to_string(),
        title: "Install Guide".to_string(),
        item_type: "markdown".to_string(),
        content: String::new(),
    })
    .unwrap();
    db.replace_item_chunks(
        "guide",
        &[KnowledgeChunk {
            id: "guide:0".to_string(),
            item_id: "guide".to_string(),
            project_id: "docs".to_string(),
            title: Some("Install".to_string()),
            content: "## Install\nUse the official installer script.".to_string(),
            order: 0,
            embeddings: Some(vec![0.75, 0.6614378]),
        }],
    )
    .unwrap();

    let provider = Arc::new(
        MockProvider::new()
            .with_embedding(question, vec![1.0, 0.0])
            .with_streams(vec![text(VALID_FORMATTED)]),
    );
    let (orchestrator, _observer) = orchestrator(provider.clone());
    let mut orchestrator = orchestrator.with_store(Arc::new(db));

    let mut request = ask(question);
    request.project_id = Some("docs".to_string());
    let outcome = orchestrator.run_turn(request).await.unwrap();

    assert_eq!(outcome.retrieval.chunks.len(), 1);
    let system = provider.stream_calls()[0].system.clone().unwrap_or_default();
    assert!(system.contains("## Relevant Knowledge Context"));
    assert!(system.contains("Use the official installer script."));
    assert!(system.contains("source: Install Guide"));
}

// ============================================================================
// Tool dispatch
// ============================================================================

#[tokio::test]
async fn test_tool_call_is_dispatched() {
    let tool_call = r#"{"actor":"agent","content":{"type":"toolCall","name":"search_docs","params":{"query":"install"},"display":"Searching the docs"}}"#;
    let provider = Arc::new(MockProvider::new().with_streams(vec![text(tool_call)]));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchDocs));
    let (orchestrator, _observer) = orchestrator(provider.clone());
    let mut orchestrator = orchestrator.with_tools(Arc::new(registry));

    let outcome = orchestrator.run_turn(ask("find install docs")).await.unwrap();

    assert_eq!(outcome.turn.actor, Actor::Tool);
    match &outcome.turn.content {
        TurnContent::ToolCall { name, display, .. } => {
            assert_eq!(name, "search_docs");
            assert_eq!(display, "2 results for 'install'");
        }
        other => panic!("unexpected content {:?}", other),
    }
    let system = provider.stream_calls()[0].system.clone().unwrap_or_default();
    assert!(system.contains("- `search_docs`: Search the product documentation"));
    assert_eq!(outcome.status.tool_name.as_deref(), Some("search_docs"));
}

#[tokio::test]
async fn test_unknown_tool_is_reported_unavailable() {
    let tool_call = r#"{"actor":"agent","content":{"type":"toolCall","name":"deploy","params":{},"display":"Deploying"}}"#;
    let provider = Arc::new(MockProvider::new().with_streams(vec![text(tool_call)]));
    let (mut orchestrator, _observer) = orchestrator(provider);

    let outcome = orchestrator.run_turn(ask("ship it")).await.unwrap();

    assert_eq!(outcome.turn.actor, Actor::Tool);
    let text = reply_text(&outcome.turn);
    assert!(text.contains("Deploying"));
    assert!(text.contains("Tool not found: deploy"));
}

// ============================================================================
// Failures narrated as replies
// ============================================================================

#[tokio::test]
async fn test_unreachable_backend_produces_connection_reply() {
    let provider = Arc::new(MockProvider::new().with_health(Err(LlmError::ProviderUnavailable {
        message: "connection refused".to_string(),
    })));
    let (mut orchestrator, _observer) = orchestrator(provider.clone());

    let outcome = orchestrator.run_turn(ask("hello")).await.unwrap();

    assert_eq!(outcome.turn.actor, Actor::Llm);
    let text = reply_text(&outcome.turn);
    assert!(text.contains("could not reach the inference backend at http://localhost:11434"));
    assert_eq!(orchestrator.backend().available, Some(false));
    assert!(provider.stream_calls().is_empty());
    assert_eq!(
        outcome.status.task(PipelineStage::Connect).unwrap().status,
        TaskStatus::Error
    );
}

#[tokio::test]
async fn test_missing_model_reply_suggests_pull_and_last_good_model() {
    let provider = Arc::new(MockProvider::new().with_streams(vec![
        text(VALID_FORMATTED),
        Err(LlmError::ModelNotFound {
            model: "qwen3".to_string(),
        }),
    ]));
    let (mut orchestrator, _observer) = orchestrator(provider);

    orchestrator.run_turn(ask("first question")).await.unwrap();
    let outcome = orchestrator.run_turn(ask("second question")).await.unwrap();

    let text = reply_text(&outcome.turn);
    assert!(text.contains("ollama pull qwen3"));
    assert!(text.contains("The last model that worked was `llama3.1`."));
}

#[tokio::test]
async fn test_server_error_is_not_reported_as_unreachable() {
    let server_error = || {
        Err(LlmError::ServerError {
            message: "model failed to load".to_string(),
            status: Some(500),
        })
    };
    let provider = Arc::new(
        MockProvider::new()
            .with_streams(vec![server_error(), server_error(), server_error()])
            .with_chat(vec![server_error(), server_error(), server_error()]),
    );
    let (mut orchestrator, _observer) = orchestrator(provider.clone());

    let outcome = orchestrator.run_turn(ask("hello")).await.unwrap();

    let text = reply_text(&outcome.turn);
    assert!(text.starts_with("The backend returned an error"));
    assert!(text.contains("model failed to load"));
    assert!(!text.contains("could not reach"));
    assert_eq!(orchestrator.backend().available, Some(true));
    // Every attempt streamed, then tried the blocking fallback.
    assert_eq!(provider.stream_calls().len(), 3);
    assert_eq!(provider.chat_calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_produce_attempt_report() {
    let provider = Arc::new(MockProvider::new().with_streams(vec![
        text("nope"),
        text("{\"actor\":\"llm\"}"),
        text("still nope"),
    ]));
    let (mut orchestrator, observer) = orchestrator(provider);

    let outcome = orchestrator.run_turn(ask("hello")).await.unwrap();

    let text = reply_text(&outcome.turn);
    assert!(text.contains("after 3 attempt(s)"));
    assert!(text.contains("- Attempt 1:"));
    assert!(text.contains("- Attempt 3:"));
    let errors = observer
        .transitions(PipelineStage::Validate)
        .into_iter()
        .filter(|s| *s == TaskStatus::Error)
        .count();
    assert_eq!(errors, 3);
}

#[tokio::test]
async fn test_empty_history_is_rejected() {
    let provider = Arc::new(MockProvider::new());
    let (mut orchestrator, observer) = orchestrator(provider);

    let err = orchestrator
        .run_turn(TurnRequest {
            chat_id: "chat-1".to_string(),
            project_id: None,
            history: vec![],
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StrategyError::InvalidInput(_)));
    assert!(observer.snapshots().is_empty());
}
