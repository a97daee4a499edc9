//! Knowledge Store
//!
//! Read-side view of the knowledge base used during a turn. The retrieval
//! engine only reads through this trait; indexing writes go through
//! [`Database`](crate::storage::database::Database) directly.

use crate::models::knowledge::{KnowledgeChunk, KnowledgeItem};
use crate::utils::error::AppResult;

pub trait KnowledgeStore: Send + Sync {
    /// Chunks of a project that have a non-empty embedding and non-blank content.
    fn searchable_chunks(&self, project_id: &str) -> AppResult<Vec<KnowledgeChunk>>;

    /// Parent items for a set of ids. Unknown ids are skipped.
    fn items_by_ids(&self, ids: &[String]) -> AppResult<Vec<KnowledgeItem>>;
}
