//! SQLite Database
//!
//! Embedded knowledge store using rusqlite with r2d2 connection pooling.
//! Embeddings are stored as little-endian f32 BLOBs.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::models::knowledge::{KnowledgeChunk, KnowledgeItem};
use crate::storage::knowledge_store::KnowledgeStore;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::database_path;

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a database from an existing connection pool.
    pub fn from_pool(pool: DbPool) -> AppResult<Self> {
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// A single pooled connection keeps every caller on the same in-memory
    /// database.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;
        Self::from_pool(pool)
    }

    /// Open the default database (~/.chat-strategy/knowledge.db)
    pub fn new() -> AppResult<Self> {
        Self::open(&database_path()?)
    }

    /// Open (or create) a database file.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;
        Self::from_pool(pool)
    }

    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS knowledge_items (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                title TEXT NOT NULL,
                item_type TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS knowledge_chunks (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL REFERENCES knowledge_items(id) ON DELETE CASCADE,
                project_id TEXT NOT NULL,
                title TEXT,
                content TEXT NOT NULL,
                chunk_order INTEGER NOT NULL,
                embedding BLOB
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_project
                ON knowledge_chunks(project_id)",
            [],
        )?;

        Ok(())
    }

    /// Get a pooled connection
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Insert or replace a knowledge item.
    pub fn upsert_knowledge_item(&self, item: &KnowledgeItem) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO knowledge_items (id, project_id, title, item_type, content)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                title = excluded.title,
                item_type = excluded.item_type,
                content = excluded.content",
            params![item.id, item.project_id, item.title, item.item_type, item.content],
        )
        .map_err(|e| AppError::database(format!("Failed to save knowledge item: {}", e)))?;
        Ok(())
    }

    /// Replace every chunk of `item_id` with `chunks`, atomically.
    pub fn replace_item_chunks(&self, item_id: &str, chunks: &[KnowledgeChunk]) -> AppResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM knowledge_chunks WHERE item_id = ?1",
            params![item_id],
        )?;

        for chunk in chunks {
            let embedding = chunk.embeddings.as_deref().map(embedding_to_bytes);
            tx.execute(
                "INSERT INTO knowledge_chunks
                    (id, item_id, project_id, title, content, chunk_order, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    chunk.id,
                    chunk.item_id,
                    chunk.project_id,
                    chunk.title,
                    chunk.content,
                    chunk.order,
                    embedding
                ],
            )
            .map_err(|e| AppError::database(format!("Failed to insert chunk: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::database(format!("Failed to commit chunks: {}", e)))?;
        Ok(())
    }

    /// List the items of a project, ordered by title.
    pub fn list_knowledge_items(&self, project_id: &str) -> AppResult<Vec<KnowledgeItem>> {
        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, project_id, title, item_type, content
                 FROM knowledge_items WHERE project_id = ?1 ORDER BY title",
            )
            .map_err(|e| AppError::database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![project_id], row_to_item)
            .map_err(|e| AppError::database(format!("Failed to query items: {}", e)))?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Number of chunks stored for an item.
    pub fn count_item_chunks(&self, item_id: &str) -> AppResult<usize> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM knowledge_chunks WHERE item_id = ?1",
            params![item_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl KnowledgeStore for Database {
    fn searchable_chunks(&self, project_id: &str) -> AppResult<Vec<KnowledgeChunk>> {
        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, item_id, project_id, title, content, chunk_order, embedding
                 FROM knowledge_chunks
                 WHERE project_id = ?1
                   AND embedding IS NOT NULL AND length(embedding) > 0
                   AND length(trim(content)) > 0
                 ORDER BY item_id, chunk_order",
            )
            .map_err(|e| AppError::database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![project_id], |row| {
                let blob: Option<Vec<u8>> = row.get(6)?;
                Ok(KnowledgeChunk {
                    id: row.get(0)?,
                    item_id: row.get(1)?,
                    project_id: row.get(2)?,
                    title: row.get(3)?,
                    content: row.get(4)?,
                    order: row.get(5)?,
                    embeddings: blob.map(|b| bytes_to_embedding(&b)),
                })
            })
            .map_err(|e| AppError::database(format!("Failed to query chunks: {}", e)))?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn items_by_ids(&self, ids: &[String]) -> AppResult<Vec<KnowledgeItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, project_id, title, item_type, content
             FROM knowledge_items WHERE id IN ({})",
            placeholders
        );

        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::database(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), row_to_item)
            .map_err(|e| AppError::database(format!("Failed to query items: {}", e)))?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    Ok(KnowledgeItem {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        item_type: row.get(3)?,
        content: row.get(4)?,
    })
}

/// Serialize an embedding to little-endian bytes for BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize a BLOB back to an f32 vector.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
