//! In-memory [`VectorStore`] for tests and throwaway indexes.
//!
//! Chunks and their vectors sit in a `Vec` behind `std::sync::RwLock`.
//! Search is brute-force cosine distance over every stored vector.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_distance, Embedder, HashEmbedder};
use crate::models::{Chunk, HitMetadata, SearchHit};

use super::{StoreInfo, VectorStore};

struct Entry {
    id: String,
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    collection: String,
    embedder: Box<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryStore {
    /// A store embedding with the default [`HashEmbedder`].
    pub fn new(collection: impl Into<String>) -> Self {
        Self::with_embedder(collection, Box::new(HashEmbedder::default()))
    }

    pub fn with_embedder(collection: impl Into<String>, embedder: Box<dyn Embedder>) -> Self {
        Self {
            collection: collection.into(),
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Stored chunks of `file_path`, ordered by index.
    pub fn chunks_for(&self, file_path: &str) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .read()?
            .iter()
            .filter(|e| e.chunk.file_path == file_path)
            .map(|e| e.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Entry>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Entry>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(anyhow!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            ));
        }

        let mut entries = self.write()?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let id = chunk.id();
            entries.retain(|e| e.id != id);
            entries.push(Entry {
                id,
                chunk: chunk.clone(),
                vector,
            });
        }
        Ok(chunks.len())
    }

    async fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|e| e.chunk.file_path != file_path);
        Ok(before - entries.len())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self.embedder.embed(query).await?;
        let entries = self.read()?;

        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter(|e| file_filter.map_or(true, |f| e.chunk.file_path.contains(f)))
            .map(|e| SearchHit {
                file_path: e.chunk.file_path.clone(),
                chunk_index: e.chunk.chunk_index,
                content: e.chunk.content.clone(),
                distance: cosine_distance(&query_vec, &e.vector),
                metadata: HitMetadata::from(&e.chunk),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.file_path.cmp(&b.file_path))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.write()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn info(&self) -> StoreInfo {
        StoreInfo {
            collection_name: self.collection.clone(),
            location: ":memory:".to_string(),
            embedding_model: self.embedder.model_name().to_string(),
        }
    }
}
