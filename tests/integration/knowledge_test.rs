//! Knowledge Integration Tests
//!
//! Chunking, indexing into in-memory SQLite and threshold-filtered
//! retrieval through the `KnowledgeStore` trait.

use std::sync::Arc;

use chat_strategy::models::knowledge::{KnowledgeChunk, KnowledgeItem};
use chat_strategy::models::status::{PipelineStage, TaskStatus};
use chat_strategy::services::knowledge::{
    KnowledgeIndexer, MarkdownChunker, RetrievalConfig, RetrievalEngine,
};
use chat_strategy::services::strategy::{RecordingObserver, TaskStatusTracker};
use chat_strategy::storage::Database;
use chat_strategy_llm::LlmError;

use super::support::MockProvider;

const QUERY: &str = "how do I install it";

fn item(id: &str, title: &str, content: &str) -> KnowledgeItem {
    KnowledgeItem {
        id: id.to_string(),
        project_id: "proj".to_string(),
        title: title.to_string(),
        item_type: "markdown".to_string(),
        content: content.to_string(),
    }
}

fn chunk(id: &str, item_id: &str, order: u32, embedding: Vec<f32>) -> KnowledgeChunk {
    KnowledgeChunk {
        id: id.to_string(),
        item_id: item_id.to_string(),
        project_id: "proj".to_string(),
        title: None,
        content: format!("passage {}", id),
        order,
        embeddings: Some(embedding),
    }
}

fn seeded_db(chunks: &[KnowledgeChunk]) -> Database {
    let db = Database::new_in_memory().unwrap();
    db.upsert_knowledge_item(&item("guide", "Install Guide", "# Guide"))
        .unwrap();
    db.replace_item_chunks("guide", chunks).unwrap();
    db
}

fn engine(provider: Arc<MockProvider>, db: Database, threshold: f32) -> RetrievalEngine {
    RetrievalEngine::new(
        provider,
        Arc::new(db),
        RetrievalConfig {
            similarity_threshold: threshold,
            top_k: 5,
            embedding_model: "nomic-embed-text".to_string(),
        },
    )
}

fn tracker() -> TaskStatusTracker {
    TaskStatusTracker::new(Arc::new(RecordingObserver::new()))
}

// ============================================================================
// Markdown Chunker
// ============================================================================

#[test]
fn test_document_without_headers_is_one_chunk() {
    let doc = "\n\nPlain notes.\nSecond line of the notes.\n\n";
    let chunks = MarkdownChunker::new().chunk(doc);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, doc.trim());
    assert_eq!(chunks[0].order, 0);
}

#[test]
fn test_chunk_content_rechunks_to_itself() {
    let doc = "# Manual\n\n## Setup\n\nInstall the toolchain first.\n\n### Windows\n\nUse the MSI installer from the site.\n\n```powershell\n# comment, not a header\nmsiexec /i demo.msi\n```\n\n## Usage\n\nRun `demo --help` for the options.";
    let chunker = MarkdownChunker::new();
    let chunks = chunker.chunk(doc);
    assert_eq!(chunks.len(), 3);
    assert!(chunks[1]
        .content
        .starts_with("# Manual\n## Setup\n### Windows\n\nUse the MSI installer"));
    for c in &chunks {
        let again = chunker.chunk(&c.content);
        assert_eq!(again.len(), 1, "rechunking {:?}", c.content);
        assert_eq!(again[0].content, c.content);
    }
}

// ============================================================================
// Knowledge Indexer
// ============================================================================

#[tokio::test]
async fn test_indexing_replaces_previous_chunks() {
    let provider = Arc::new(MockProvider::new());
    let db = Database::new_in_memory().unwrap();
    let indexer = KnowledgeIndexer::new(provider.clone(), db.clone(), "nomic-embed-text");

    let mut doc = item(
        "guide",
        "Guide",
        "## One\nFirst section body text.\n## Two\nSecond section body text.\n## Three\nThird section body text.",
    );
    assert_eq!(indexer.index_item(&doc).await.unwrap(), 3);
    assert_eq!(db.count_item_chunks("guide").unwrap(), 3);
    assert_eq!(provider.embed_calls(), 3);

    doc.content = "## Only\nThe single remaining section.".to_string();
    assert_eq!(indexer.index_item(&doc).await.unwrap(), 1);
    assert_eq!(db.count_item_chunks("guide").unwrap(), 1);
    assert_eq!(db.list_knowledge_items("proj").unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_embedding_keeps_previous_index() {
    let db = Database::new_in_memory().unwrap();
    let doc = item("guide", "Guide", "## One\nFirst section body text.");

    let ok = KnowledgeIndexer::new(Arc::new(MockProvider::new()), db.clone(), "m");
    ok.index_item(&doc).await.unwrap();

    let failing = KnowledgeIndexer::new(
        Arc::new(MockProvider::new().with_default_embedding(Err(LlmError::ModelNotFound {
            model: "m".to_string(),
        }))),
        db.clone(),
        "m",
    );
    assert!(failing.index_item(&doc).await.is_err());
    assert_eq!(db.count_item_chunks("guide").unwrap(), 1);
}

// ============================================================================
// Retrieval Engine
// ============================================================================

#[tokio::test]
async fn test_chunk_below_threshold_is_not_returned() {
    let provider = Arc::new(MockProvider::new().with_embedding(QUERY, vec![1.0, 0.0]));
    let db = seeded_db(&[chunk("c0", "guide", 0, vec![0.65, 0.7599342])]);
    let mut tracker = tracker();

    let result = engine(provider, db, 0.70)
        .retrieve(QUERY, "proj", &mut tracker)
        .await;

    assert!(result.is_empty());
    assert!(result.summary.is_empty());
    assert_eq!(
        tracker.stage_status(PipelineStage::Retrieve),
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_chunk_above_threshold_is_returned_with_parent() {
    let provider = Arc::new(MockProvider::new().with_embedding(QUERY, vec![1.0, 0.0]));
    let db = seeded_db(&[chunk("c0", "guide", 0, vec![0.75, 0.6614378])]);
    let mut tracker = tracker();

    let result = engine(provider, db, 0.70)
        .retrieve(QUERY, "proj", &mut tracker)
        .await;

    assert_eq!(result.chunks.len(), 1);
    let hit = &result.chunks[0];
    assert!((hit.similarity - 0.75).abs() < 1e-4);
    assert_eq!(hit.item_title.as_deref(), Some("Install Guide"));
    assert_eq!(hit.item_type.as_deref(), Some("markdown"));
    assert_eq!(result.summary, "1 passage(s) from: Install Guide (1)");
}

#[tokio::test]
async fn test_results_are_ranked_and_bounded() {
    let provider = Arc::new(MockProvider::new().with_embedding(QUERY, vec![1.0, 0.0]));
    let chunks: Vec<KnowledgeChunk> = (0..8)
        .map(|i| {
            let x = 0.72 + i as f32 * 0.03;
            chunk(&format!("c{}", i), "guide", i, vec![x, 1.0 - x])
        })
        .collect();
    let db = seeded_db(&chunks);
    let mut tracker = tracker();

    let result = engine(provider, db, 0.0)
        .retrieve(QUERY, "proj", &mut tracker)
        .await;

    assert_eq!(result.chunks.len(), 5);
    assert_eq!(result.chunks[0].chunk_id, "c7");
    for pair in result.chunks.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

#[tokio::test]
async fn test_mismatched_dimensions_are_skipped() {
    let provider = Arc::new(MockProvider::new().with_embedding(QUERY, vec![1.0, 0.0]));
    let db = seeded_db(&[
        chunk("c0", "guide", 0, vec![1.0, 0.0, 0.0]),
        chunk("c1", "guide", 1, vec![0.9, 0.1]),
    ]);
    let mut tracker = tracker();

    let result = engine(provider, db, 0.5)
        .retrieve(QUERY, "proj", &mut tracker)
        .await;

    assert_eq!(result.chunks.len(), 1);
    assert_eq!(result.chunks[0].chunk_id, "c1");
}

#[tokio::test]
async fn test_embedding_failure_degrades_to_empty_context() {
    let provider = Arc::new(MockProvider::new().with_default_embedding(Err(
        LlmError::ProviderUnavailable {
            message: "refused".to_string(),
        },
    )));
    let db = seeded_db(&[chunk("c0", "guide", 0, vec![1.0, 0.0])]);
    let mut tracker = tracker();

    let result = engine(provider, db, 0.7)
        .retrieve(QUERY, "proj", &mut tracker)
        .await;

    assert!(result.is_empty());
    assert_eq!(
        tracker.stage_status(PipelineStage::Retrieve),
        TaskStatus::Error
    );
    assert!(tracker
        .snapshot()
        .task(PipelineStage::Retrieve)
        .unwrap()
        .message
        .starts_with("Could not embed the request"));
}
