//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is everything the synchronizer and search
//! command need from persistent storage: add chunk sets, drop a file's
//! chunks, rank chunks against a query, and report size and identity. The
//! store owns embedding; callers only ever hand it text.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, SearchHit};

/// Identity of a store, as reported by `stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub collection_name: String,
    /// Where the data lives (a file path, or `":memory:"`).
    pub location: String,
    pub embedding_model: String,
}

/// Abstract vector index keyed by `(file_path, chunk_index)`.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Embed and insert chunks (upsert by id) |
/// | [`delete_by_file`](VectorStore::delete_by_file) | Remove every chunk of one file |
/// | [`replace_file`](VectorStore::replace_file) | Delete then add one file's chunk set |
/// | [`search`](VectorStore::search) | Rank chunks by cosine distance to a query |
/// | [`count`](VectorStore::count) | Number of stored chunks |
/// | [`clear`](VectorStore::clear) | Remove every chunk |
/// | [`prune`](VectorStore::prune) | Drop derived data no stored chunk uses |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert `chunks`, replacing any stored chunk with the same id.
    /// Returns the number of chunks written.
    async fn add(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Remove all chunks whose `file_path` equals `file_path` exactly.
    async fn delete_by_file(&self, file_path: &str) -> Result<usize>;

    /// Up to `top_k` hits ordered by ascending distance. With `file_filter`,
    /// only chunks whose path contains it as a substring are considered.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    async fn count(&self) -> Result<usize>;

    /// Remove every chunk, returning how many were removed.
    async fn clear(&self) -> Result<usize>;

    fn info(&self) -> StoreInfo;

    /// Drop cached data (such as memoized vectors) that no stored chunk
    /// refers to any more. Returns how many entries were removed.
    async fn prune(&self) -> Result<usize> {
        Ok(0)
    }

    /// Replace a file's chunk set wholesale. Returns `(deleted, added)`.
    ///
    /// Not atomic: a failure between the two steps leaves the file with no
    /// chunks until the next sync recomputes it.
    async fn replace_file(&self, file_path: &str, chunks: &[Chunk]) -> Result<(usize, usize)> {
        let deleted = self.delete_by_file(file_path).await?;
        let added = self.add(chunks).await?;
        Ok((deleted, added))
    }
}
