//! Knowledge System
//!
//! Retrieval-augmentation for the strategy pipeline:
//! - `chunker`: header-aware markdown chunking
//! - `indexer`: chunk + embed + persist a knowledge item
//! - `retrieval`: cosine-similarity search and context formatting

pub mod chunker;
pub mod indexer;
pub mod retrieval;

pub use chunker::{MarkdownChunk, MarkdownChunker};
pub use indexer::KnowledgeIndexer;
pub use retrieval::{
    cosine_similarity, format_context_block, RetrievalConfig, RetrievalEngine, RetrievalResult,
    RetrievedChunk,
};
