//! Knowledge Base Models

use serde::{Deserialize, Serialize};

/// A knowledge document owned by a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub id: String,
    pub project_id: String,
    pub title: String,
    /// Free-form document type, e.g. "markdown", "note"
    pub item_type: String,
    pub content: String,
}

impl KnowledgeItem {
    pub fn markdown(
        project_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            title: title.into(),
            item_type: "markdown".to_string(),
            content: content.into(),
        }
    }
}

/// A retrieval-sized passage of a [`KnowledgeItem`].
///
/// `order` is the 0-based position within `item_id`; `content` is never
/// empty after trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeChunk {
    pub id: String,
    pub item_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<f32>>,
}

impl KnowledgeChunk {
    /// Has a usable embedding and non-blank content.
    pub fn is_searchable(&self) -> bool {
        self.embeddings.as_ref().is_some_and(|e| !e.is_empty()) && !self.content.trim().is_empty()
    }
}
