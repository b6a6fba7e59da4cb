//! In-memory [`VectorStore`] for tests and ephemeral deployments.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`; search is
//! brute-force cosine similarity over all stored vectors.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::RwLock;

use super::{cosine_similarity, EmbeddedChunk, ScoredChunk, VectorStore};

#[derive(Default)]
pub struct MemoryStore {
    chunks: RwLock<Vec<EmbeddedChunk>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        stored.extend_from_slice(chunks);
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        Ok(stored.len() as i64)
    }

    async fn clear(&self) -> Result<()> {
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        stored.clear();
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;

        let mut scored: Vec<ScoredChunk> = stored
            .iter()
            .map(|c| ScoredChunk {
                chunk_id: c.id.clone(),
                document_id: c.document_id.clone(),
                text: c.text.clone(),
                score: cosine_similarity(query, &c.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }
}
