//! Retrieval Engine
//!
//! Linear cosine-similarity scan over one project's embedded chunks.
//! Retrieval is best-effort: any failure yields an empty result and an
//! errored `retrieve` stage, never an error to the caller.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chat_strategy_llm::LlmProvider;

use crate::models::settings::AppConfig;
use crate::models::status::PipelineStage;
use crate::services::strategy::tracker::TaskStatusTracker;
use crate::storage::knowledge_store::KnowledgeStore;
use crate::utils::error::{AppError, AppResult};

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either vector has zero magnitude and an error when the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> AppResult<f32> {
    if a.len() != b.len() {
        return Err(AppError::validation(format!(
            "Embedding dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        Ok(0.0)
    } else {
        Ok(dot / denom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub embedding_model: String,
}

impl RetrievalConfig {
    pub fn from_settings(settings: &AppConfig) -> Self {
        Self {
            similarity_threshold: settings.similarity_threshold,
            top_k: settings.retrieval_top_k,
            embedding_model: settings.embedding_model.clone(),
        }
    }
}

/// One ranked passage with its parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub content: String,
    pub similarity: f32,
    pub order: u32,
    pub item_title: Option<String>,
    pub item_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    /// e.g. `3 passage(s) from: Guide (2), FAQ (1)`; empty when nothing matched.
    pub summary: String,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub struct RetrievalEngine {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn KnowledgeStore>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn KnowledgeStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rank `project_id`'s chunks against `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        project_id: &str,
        tracker: &mut TaskStatusTracker,
    ) -> RetrievalResult {
        tracker.start(PipelineStage::Retrieve, "Searching the knowledge base");

        match self.search(query, project_id, tracker).await {
            Ok(chunks) => {
                let summary = summarize(&chunks);
                let message = if chunks.is_empty() {
                    "No relevant passages".to_string()
                } else {
                    summary.clone()
                };
                tracker.complete(PipelineStage::Retrieve, message);
                RetrievalResult { chunks, summary }
            }
            Err(e) => {
                warn!(project_id, error = %e, "retrieval: failed, continuing without context");
                let message = if e.is_backend() {
                    format!("Could not embed the request: {}", e)
                } else {
                    format!("Knowledge search failed: {}", e)
                };
                tracker.fail(PipelineStage::Retrieve, message);
                RetrievalResult::default()
            }
        }
    }

    async fn search(
        &self,
        query: &str,
        project_id: &str,
        tracker: &mut TaskStatusTracker,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let query_embedding = self
            .provider
            .embed(query, &self.config.embedding_model)
            .await?;
        if query_embedding.is_empty() {
            return Err(AppError::embedding("Empty query embedding"));
        }

        let candidates = self.store.searchable_chunks(project_id)?;
        tracker.update(
            PipelineStage::Retrieve,
            format!("Scoring {} passage(s)", candidates.len()),
        );

        let mut scored = Vec::new();
        for chunk in candidates {
            let Some(embedding) = chunk.embeddings.as_deref() else {
                continue;
            };
            match cosine_similarity(&query_embedding, embedding) {
                Ok(similarity) if similarity >= self.config.similarity_threshold => {
                    scored.push((chunk, similarity));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(chunk_id = %chunk.id, error = %e, "retrieval: skipping chunk");
                }
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.config.top_k);

        let mut item_ids: Vec<String> = scored.iter().map(|(c, _)| c.item_id.clone()).collect();
        item_ids.sort();
        item_ids.dedup();
        let items: HashMap<String, (String, String)> = self
            .store
            .items_by_ids(&item_ids)?
            .into_iter()
            .map(|i| (i.id, (i.title, i.item_type)))
            .collect();

        debug!(
            project_id,
            matched = scored.len(),
            threshold = self.config.similarity_threshold,
            "retrieval: ranked chunks"
        );

        Ok(scored
            .into_iter()
            .map(|(chunk, similarity)| {
                let parent = items.get(&chunk.item_id);
                RetrievedChunk {
                    chunk_id: chunk.id,
                    content: chunk.content,
                    similarity,
                    order: chunk.order,
                    item_title: parent.map(|(title, _)| title.clone()),
                    item_type: parent.map(|(_, kind)| kind.clone()),
                }
            })
            .collect())
    }
}

/// Distinct parent titles with their passage counts, in rank order.
fn summarize(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for chunk in chunks {
        let title = chunk.item_title.as_deref().unwrap_or("Untitled");
        match counts.iter_mut().find(|(t, _)| t == title) {
            Some((_, n)) => *n += 1,
            None => counts.push((title.to_string(), 1)),
        }
    }

    let sources = counts
        .iter()
        .map(|(title, n)| format!("{} ({})", title, n))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} passage(s) from: {}", chunks.len(), sources)
}

/// Render ranked chunks as a prompt section. Empty input renders nothing.
pub fn format_context_block(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut block = String::from("## Relevant Knowledge Context\n\n");
    block.push_str("The following passages were retrieved from the project knowledge base:\n\n");

    for (i, chunk) in chunks.iter().enumerate() {
        block.push_str(&format!(
            "### Context {} (relevance: {:.2}, source: {})\n\n",
            i + 1,
            chunk.similarity,
            chunk.item_title.as_deref().unwrap_or("Untitled"),
        ));
        block.push_str(&chunk.content);
        block.push_str("\n\n---\n\n");
    }

    block
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
