//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait defines the four operations the engine needs
//! from its storage backend — insert, count, delete-all, similarity
//! search — enabling pluggable backends selected at construction time.
//!
//! Implementations must be `Send + Sync` to be shared across request
//! handlers.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Settings, VectorStoreKind};

/// A chunk with its embedding vector, ready for storage.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub vector: Vec<f32>,
}

/// A chunk returned from similarity search, best first.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub score: f32,
}

/// Abstract vector storage backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert embedded chunks into the collection.
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Number of chunks currently stored.
    async fn count(&self) -> Result<i64>;

    /// Remove every chunk from the collection.
    async fn clear(&self) -> Result<()>;

    /// Return up to `limit` chunks ranked by cosine similarity to the query
    /// vector, highest first.
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;
}

/// Create the configured [`VectorStore`].
pub async fn create_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    match settings.vector_store {
        VectorStoreKind::Sqlite => Ok(Arc::new(
            sqlite::SqliteStore::connect(&settings.collection_path()).await?,
        )),
        VectorStoreKind::Memory => Ok(Arc::new(memory::MemoryStore::new())),
    }
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
