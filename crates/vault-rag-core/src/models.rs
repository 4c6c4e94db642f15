//! Core data models shared by the chunker, resolver, and stores.
//!
//! These types represent the passages, change sets, and search hits that
//! flow between the vault on disk and the vector index.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A finalized passage of a note, ready for embedding.
///
/// A chunk's durable key is `file_path` + `chunk_index`. Re-chunking a file
/// always replaces its whole chunk set, so indices stay dense per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Repo-relative path of the source note.
    pub file_path: String,
    /// Position within the file's chunk list, dense from 0.
    pub chunk_index: usize,
    /// Cleaned, heading-prefixed text to embed.
    pub content: String,
    /// Nearest enclosing H1/H2 heading text (empty if none).
    pub heading: String,
    /// `1` or `2` for a heading, `0` for the headerless leading section.
    pub heading_level: u8,
    /// Document-level metadata plus this chunk's inline tags.
    pub metadata: ChunkMetadata,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

impl Chunk {
    /// Store key: `"{file_path}::{chunk_index}"`.
    pub fn id(&self) -> String {
        chunk_id(&self.file_path, self.chunk_index)
    }
}

/// Build the store key for a chunk position.
pub fn chunk_id(file_path: &str, chunk_index: usize) -> String {
    format!("{}::{}", file_path, chunk_index)
}

/// Metadata attached to every chunk of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    /// Frontmatter tags unioned with the chunk's inline `#tags`.
    pub tags: BTreeSet<String>,
    /// Outgoing wikilink targets of the whole document.
    #[serde(default)]
    pub links: BTreeSet<String>,
    /// Frontmatter keys other than `title` and `tags`.
    #[serde(default)]
    pub frontmatter: BTreeMap<String, serde_json::Value>,
}

/// Partition of the tracked file set relative to a history reference.
///
/// Renames never appear as their own bucket: the old path is listed under
/// `deleted` and the new path under `added`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// One ranked result from [`VectorStore::search`](crate::store::VectorStore::search).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub file_path: String,
    pub chunk_index: usize,
    pub content: String,
    /// Cosine distance; smaller is more similar.
    pub distance: f32,
    pub metadata: HitMetadata,
}

/// The subset of chunk metadata returned with a search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HitMetadata {
    pub title: String,
    pub tags: Vec<String>,
    pub heading: String,
}

impl From<&Chunk> for HitMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            title: chunk.metadata.title.clone(),
            tags: chunk.metadata.tags.iter().cloned().collect(),
            heading: chunk.heading.clone(),
        }
    }
}
