use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::debug;

use adaptrag_core::error::{RagError, Result};
use adaptrag_core::types::Document;

use crate::embeddings::cosine_similarity;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection, id);";

fn db_err(e: impl std::fmt::Display) -> RagError {
    RagError::Database(e.to_string())
}

/// A document paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// SQLite-backed vector collection with brute-force cosine search.
pub struct VectorStore {
    conn: Mutex<Connection>,
    collection: String,
}

impl VectorStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RagError::Database(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), collection, "Vector store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
        })
    }

    /// Open an in-memory database.
    pub fn in_memory(collection: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert documents with their embeddings. Returns the number inserted.
    pub fn add(&self, documents: &[Document], embeddings: &[Vec<f32>]) -> Result<usize> {
        if documents.len() != embeddings.len() {
            return Err(RagError::Database(format!(
                "{} documents but {} embeddings",
                documents.len(),
                embeddings.len()
            )));
        }

        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (collection, content, metadata, embedding)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_err)?;
            for (doc, embedding) in documents.iter().zip(embeddings) {
                let metadata = serde_json::to_string(&doc.metadata)?;
                let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
                stmt.execute(params![self.collection, doc.content, metadata, blob])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(documents.len())
    }

    /// Remove every chunk of this collection.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute("DELETE FROM chunks WHERE collection = ?1", params![self.collection])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                params![self.collection],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(n as usize)
    }

    /// Top `limit` chunks by cosine similarity, most similar first.
    ///
    /// Ties keep insertion order. Chunks below `min_score` are dropped.
    pub fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredDocument>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT content, metadata, embedding FROM chunks
                 WHERE collection = ?1
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![self.collection], |row| {
                let content: String = row.get(0)?;
                let metadata: String = row.get(1)?;
                let blob: Vec<u8> = row.get(2)?;
                Ok((content, metadata, blob))
            })
            .map_err(db_err)?;

        let mut scored = Vec::new();
        for row in rows {
            let (content, metadata, blob) = row.map_err(db_err)?;

            let embedding: Vec<f32> = blob
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            let score = cosine_similarity(query_vec, &embedding);
            if min_score.is_some_and(|min| score < min) {
                continue;
            }

            let metadata: HashMap<String, serde_json::Value> =
                serde_json::from_str(&metadata).unwrap_or_default();
            scored.push(ScoredDocument {
                document: Document { content, metadata },
                score,
            });
        }

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("agent memory").with_metadata("source", serde_json::json!("a")),
            Document::new("prompt engineering").with_metadata("source", serde_json::json!("b")),
            Document::new("adversarial attacks").with_metadata("source", serde_json::json!("c")),
        ]
    }

    fn vectors() -> Vec<Vec<f32>> {
        vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.7, 0.7, 0.0]]
    }

    #[test]
    fn test_add_and_count() {
        let store = VectorStore::in_memory("rag-chroma").unwrap();
        assert_eq!(store.add(&docs(), &vectors()).unwrap(), 3);
        assert_eq!(store.count().unwrap(), 3);
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let store = VectorStore::in_memory("rag-chroma").unwrap();
        store.add(&docs(), &vectors()).unwrap();

        let results = store.search(&[1.0, 0.1, 0.0], 2, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.content, "agent memory");
        assert_eq!(results[1].document.content, "adversarial attacks");
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].document.source(), Some("a"));
    }

    #[test]
    fn test_search_min_score_filters() {
        let store = VectorStore::in_memory("rag-chroma").unwrap();
        store.add(&docs(), &vectors()).unwrap();

        let results = store.search(&[0.0, 0.0, 1.0], 4, Some(0.5)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let a = VectorStore::open(&path, "a").unwrap();
        a.add(&docs(), &vectors()).unwrap();
        let b = VectorStore::open(&path, "b").unwrap();
        assert_eq!(b.count().unwrap(), 0);
        assert_eq!(a.count().unwrap(), 3);
    }

    #[test]
    fn test_add_length_mismatch() {
        let store = VectorStore::in_memory("x").unwrap();
        assert!(store.add(&docs(), &vectors()[..1]).is_err());
    }
}
