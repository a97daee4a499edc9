//! Knowledge Indexer
//!
//! Chunks a knowledge item, embeds every chunk and stores the result,
//! replacing whatever chunks the item had before.

use std::sync::Arc;

use tracing::info;

use chat_strategy_llm::LlmProvider;

use super::chunker::MarkdownChunker;
use crate::models::knowledge::KnowledgeItem;
use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

pub struct KnowledgeIndexer {
    provider: Arc<dyn LlmProvider>,
    db: Database,
    chunker: MarkdownChunker,
    embedding_model: String,
}

impl KnowledgeIndexer {
    pub fn new(provider: Arc<dyn LlmProvider>, db: Database, embedding_model: impl Into<String>) -> Self {
        Self {
            provider,
            db,
            chunker: MarkdownChunker::new(),
            embedding_model: embedding_model.into(),
        }
    }

    pub fn with_chunker(mut self, chunker: MarkdownChunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Index `item` and return the number of stored chunks.
    ///
    /// Embeddings are computed before anything is written, so a failed
    /// embedding leaves the previous index of the item untouched.
    pub async fn index_item(&self, item: &KnowledgeItem) -> AppResult<usize> {
        if item.project_id.trim().is_empty() {
            return Err(AppError::validation("Knowledge item has no project"));
        }

        let mut chunks = self.chunker.chunk_item(item);
        for chunk in chunks.iter_mut() {
            let embedding = self.provider.embed(&chunk.content, &self.embedding_model).await?;
            if embedding.is_empty() {
                return Err(AppError::embedding(format!(
                    "Backend returned an empty embedding for chunk {}",
                    chunk.id
                )));
            }
            chunk.embeddings = Some(embedding);
        }

        self.db.upsert_knowledge_item(item)?;
        self.db.replace_item_chunks(&item.id, &chunks)?;

        info!(
            item_id = %item.id,
            project_id = %item.project_id,
            chunks = chunks.len(),
            model = %self.embedding_model,
            "indexer: item indexed"
        );
        Ok(chunks.len())
    }
}
