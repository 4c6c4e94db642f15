use anyhow::Result;
use serde::Serialize;

use vault_rag_core::search::{search_vault, SearchResponse};
use vault_rag_core::store::VectorStore;

pub const EMPTY_INDEX_MESSAGE: &str = "No documents indexed. Run full-index first.";

/// What `vault-rag search` prints. `EmptyIndex` exits with status 1.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Results(SearchResponse),
    EmptyIndex {
        error: String,
        query: String,
        results: Vec<serde_json::Value>,
        total: usize,
    },
}

impl SearchOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, SearchOutcome::EmptyIndex { .. })
    }
}

pub async fn run_search<S: VectorStore + ?Sized>(
    store: &S,
    query: &str,
    top_k: usize,
    file_filter: Option<&str>,
) -> Result<SearchOutcome> {
    if store.count().await? == 0 {
        return Ok(SearchOutcome::EmptyIndex {
            error: EMPTY_INDEX_MESSAGE.to_string(),
            query: query.to_string(),
            results: Vec::new(),
            total: 0,
        });
    }

    let response = search_vault(store, query, top_k.max(1), file_filter).await?;
    Ok(SearchOutcome::Results(response))
}
