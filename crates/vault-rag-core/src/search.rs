//! Filtered semantic search over a [`VectorStore`].
//!
//! Ranking is entirely the store's business. A file filter is applied twice:
//! the store is asked for three times the requested count restricted to the
//! filter, then the hits are filtered again by substring on `file_path` and
//! truncated back to `top_k`.

use anyhow::Result;
use serde::Serialize;

use crate::models::SearchHit;
use crate::store::VectorStore;

/// Candidate widening factor applied when a file filter is present.
pub const FILTER_OVERFETCH: usize = 3;

/// The JSON shape printed by `vault-rag search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total: usize,
}

pub async fn search_vault<S: VectorStore + ?Sized>(
    store: &S,
    query: &str,
    top_k: usize,
    file_filter: Option<&str>,
) -> Result<SearchResponse> {
    let file_filter = file_filter.filter(|f| !f.is_empty());

    let results = match file_filter {
        Some(filter) => {
            let mut hits = store
                .search(query, top_k.saturating_mul(FILTER_OVERFETCH), Some(filter))
                .await?;
            hits.retain(|h| h.file_path.contains(filter));
            hits.truncate(top_k);
            hits
        }
        None => store.search(query, top_k, None).await?,
    };

    Ok(SearchResponse {
        query: query.to_string(),
        total: results.len(),
        results,
    })
}
