//! Strategy Pipeline Integration Tests
//!
//! Call handler retries, the reasoning selector and intent extraction
//! against the scripted backend.

use std::sync::Arc;
use std::time::Duration;

use chat_strategy::models::conversation::{Actor, ConversationTurn, TurnContent};
use chat_strategy::models::status::{PipelineStage, TaskStatus};
use chat_strategy::services::strategy::{
    CallRequest, DecisionSource, IntentExtractor, LlmCallHandler, ReasoningSelector,
    RecordingObserver, RetryPolicy, StrategyError, TaskStatusTracker, MAX_RETRIES,
};
use chat_strategy_llm::{LlmError, LlmRequestOptions, Message};

use super::support::{text, MockProvider, VALID_FORMATTED};

fn tracker() -> (TaskStatusTracker, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    (TaskStatusTracker::new(observer.clone()), observer)
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        backoff_base: Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

fn call_request() -> CallRequest {
    CallRequest {
        messages: vec![Message::user("How do I install demo?")],
        system: Some("answer in JSON".to_string()),
        options: LlmRequestOptions::for_model("llama3.1"),
    }
}

// ============================================================================
// LLM Call Handler
// ============================================================================

#[tokio::test]
async fn test_third_attempt_succeeds_after_two_invalid_replies() {
    let provider = Arc::new(MockProvider::new().with_streams(vec![
        text("Sorry, here is the answer: Run cargo install."),
        text(r#"{"actor":"llm","content":{"type":"formatted"}}"#),
        text(VALID_FORMATTED),
    ]));
    let handler = LlmCallHandler::with_policy(provider.clone(), fast_policy());
    let (mut tracker, observer) = tracker();

    let outcome = handler.call(&call_request(), &mut tracker).await.unwrap();

    assert_eq!(outcome.attempt, 3);
    assert_eq!(outcome.raw_text, VALID_FORMATTED);
    assert_eq!(outcome.failed_attempts.len(), 2);
    assert_eq!(provider.stream_calls().len(), 3);

    let validate: Vec<TaskStatus> = observer
        .transitions(PipelineStage::Validate)
        .into_iter()
        .filter(|s| matches!(s, TaskStatus::Error | TaskStatus::Completed))
        .collect();
    assert_eq!(
        validate,
        vec![TaskStatus::Error, TaskStatus::Error, TaskStatus::Completed]
    );

    let retry_counters: Vec<(Option<u32>, Option<u32>)> = observer
        .snapshots()
        .iter()
        .map(|s| (s.retry_attempt, s.max_retries))
        .collect();
    assert!(retry_counters.contains(&(Some(3), Some(MAX_RETRIES))));
}

#[tokio::test]
async fn test_validation_error_carries_every_attempt() {
    let provider = Arc::new(MockProvider::new().with_streams(vec![
        text("no json"),
        text("still no json"),
        text("{\"actor\":"),
    ]));
    let handler = LlmCallHandler::with_policy(provider, fast_policy());
    let (mut tracker, _observer) = tracker();

    match handler.call(&call_request(), &mut tracker).await {
        Err(StrategyError::Validation { attempts }) => {
            assert_eq!(attempts.len(), 3);
            assert_eq!(attempts[1].raw_response, "still no json");
            assert!(attempts[2].error_description.contains("not closed"));
        }
        other => panic!("expected validation error, got {:?}", other.map(|o| o.attempt)),
    }
}

#[tokio::test]
async fn test_stream_timeout_falls_back_to_blocking_call() {
    let provider = Arc::new(
        MockProvider::new()
            .with_stream_delay(Duration::from_millis(500))
            .with_streams(vec![text(VALID_FORMATTED)])
            .with_chat(vec![text(VALID_FORMATTED)]),
    );
    let policy = fast_policy().with_stream_timeout(Duration::from_millis(20));
    let handler = LlmCallHandler::with_policy(provider.clone(), policy);
    let (mut tracker, _observer) = tracker();

    let outcome = handler.call(&call_request(), &mut tracker).await.unwrap();

    assert_eq!(outcome.attempt, 1);
    assert_eq!(provider.chat_calls(), 1);
    assert_eq!(tracker.snapshot().current_actor.as_deref(), Some("llm"));
}

#[tokio::test]
async fn test_missing_model_fails_without_retry() {
    let provider = Arc::new(MockProvider::new().with_streams(vec![Err(
        LlmError::ModelNotFound {
            model: "llama3.1".to_string(),
        },
    )]));
    let handler = LlmCallHandler::with_policy(provider.clone(), fast_policy());
    let (mut tracker, _observer) = tracker();

    let err = handler.call(&call_request(), &mut tracker).await.unwrap_err();

    assert!(matches!(err, StrategyError::ModelUnavailable { .. }));
    assert_eq!(provider.stream_calls().len(), 1);
    assert_eq!(provider.chat_calls(), 0);
}

#[tokio::test]
async fn test_tool_call_signals_reach_tracker() {
    let tool_call = r#"{"actor":"agent","content":{"type":"toolCall","name":"search_docs","params":{"query":"install"},"display":"Searching the docs"}}"#;
    let provider = Arc::new(MockProvider::new().with_streams(vec![text(tool_call)]));
    let handler = LlmCallHandler::with_policy(provider, fast_policy());
    let (mut tracker, _observer) = tracker();

    handler.call(&call_request(), &mut tracker).await.unwrap();

    let status = tracker.snapshot();
    assert_eq!(status.current_actor.as_deref(), Some("agent"));
    assert_eq!(status.tool_name.as_deref(), Some("search_docs"));
    assert_eq!(
        tracker.stage_status(PipelineStage::AnalyzeRequest),
        TaskStatus::Completed
    );
}

// ============================================================================
// Advanced-Reasoning Selector
// ============================================================================

#[tokio::test]
async fn test_no_keywords_means_no_model_call() {
    let provider = Arc::new(MockProvider::new());
    let selector = ReasoningSelector::new(provider.clone(), "llama3.2");
    let (mut tracker, _observer) = tracker();

    let decision = selector
        .decide("What is the capital of France?", &mut tracker)
        .await;

    assert!(!decision.activate);
    assert_eq!(decision.source, DecisionSource::Keywords);
    assert_eq!(provider.chat_calls(), 0);
    assert_eq!(
        tracker.stage_status(PipelineStage::DecideReasoning),
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_french_proof_request_consults_intermediate_model() {
    let provider = Arc::new(MockProvider::new().with_chat(vec![text(
        r#"{"activate": true, "reason": "multi-step proof"}"#,
    )]));
    let selector = ReasoningSelector::new(provider.clone(), "llama3.2");
    let (mut tracker, _observer) = tracker();

    let decision = selector
        .decide(
            "explique-moi cette preuve mathématique étape par étape",
            &mut tracker,
        )
        .await;

    assert!(decision.score.total() >= 3.0);
    assert_eq!(provider.chat_models(), vec!["llama3.2".to_string()]);
    assert!(decision.activate);
    assert_eq!(decision.source, DecisionSource::Model);
    assert_eq!(decision.reason, "multi-step proof");
    assert!(tracker.snapshot().deep_reasoning);
}

#[tokio::test]
async fn test_model_can_veto_deep_reasoning() {
    let provider = Arc::new(MockProvider::new().with_chat(vec![text(
        "Sure: {\"activate\": false, \"reason\": \"simple lookup\"}",
    )]));
    let selector = ReasoningSelector::new(provider, "llama3.2");
    let (mut tracker, _observer) = tracker();

    let decision = selector
        .decide("this is wrong, again, explain it", &mut tracker)
        .await;

    assert!(!decision.activate);
    assert_eq!(decision.source, DecisionSource::Model);
}

#[tokio::test]
async fn test_unparseable_verdict_falls_back_to_keyword_score() {
    let provider = Arc::new(MockProvider::new().with_chat(vec![text("I think yes")]));
    let selector = ReasoningSelector::new(provider, "llama3.2");
    let (mut tracker, _observer) = tracker();

    let decision = selector
        .decide(
            "explique-moi cette preuve mathématique étape par étape",
            &mut tracker,
        )
        .await;

    assert!(decision.activate);
    assert_eq!(decision.source, DecisionSource::Fallback);
    assert_eq!(
        tracker.stage_status(PipelineStage::DecideReasoning),
        TaskStatus::Error
    );
}

#[tokio::test]
async fn test_disabled_selector_never_activates() {
    let provider = Arc::new(MockProvider::new());
    let selector = ReasoningSelector::new(provider.clone(), "llama3.2").enabled(false);
    let (mut tracker, _observer) = tracker();

    let decision = selector
        .decide(
            "explique-moi cette preuve mathématique étape par étape",
            &mut tracker,
        )
        .await;

    assert!(!decision.activate);
    assert_eq!(decision.source, DecisionSource::Disabled);
    assert_eq!(provider.chat_calls(), 0);
}

// ============================================================================
// Intent Extraction
// ============================================================================

#[tokio::test]
async fn test_single_turn_intent_skips_model() {
    let provider = Arc::new(MockProvider::new());
    let extractor = IntentExtractor::new(provider.clone(), "llama3.2");
    let (mut tracker, _observer) = tracker();

    let history = vec![ConversationTurn::user("chat", "How do I install demo?")];
    let intent = extractor.extract(&history, &mut tracker).await;

    assert_eq!(intent, "How do I install demo?");
    assert_eq!(provider.chat_calls(), 0);
}

#[tokio::test]
async fn test_multi_turn_intent_is_rewritten() {
    let provider = Arc::new(
        MockProvider::new().with_chat(vec![text("  How do I install demo on Linux?\n")]),
    );
    let extractor = IntentExtractor::new(provider.clone(), "llama3.2");
    let (mut tracker, _observer) = tracker();

    let history = vec![
        ConversationTurn::user("chat", "How do I install demo?"),
        ConversationTurn::new("chat", Actor::Llm, TurnContent::markdown("Which OS?")),
        ConversationTurn::user("chat", "Linux"),
    ];
    let intent = extractor.extract(&history, &mut tracker).await;

    assert_eq!(intent, "How do I install demo on Linux?");
    assert_eq!(provider.chat_models(), vec!["llama3.2".to_string()]);
}

#[tokio::test]
async fn test_failed_rewrite_uses_last_user_message() {
    let provider = Arc::new(MockProvider::new().with_chat(vec![Err(LlmError::NetworkError {
        message: "reset".to_string(),
    })]));
    let extractor = IntentExtractor::new(provider, "llama3.2");
    let (mut tracker, _observer) = tracker();

    let history = vec![
        ConversationTurn::user("chat", "first"),
        ConversationTurn::new("chat", Actor::Llm, TurnContent::markdown("ok")),
        ConversationTurn::user("chat", "second"),
    ];
    let intent = extractor.extract(&history, &mut tracker).await;

    assert_eq!(intent, "second");
    assert_eq!(
        tracker.stage_status(PipelineStage::ExtractIntent),
        TaskStatus::Error
    );
}
