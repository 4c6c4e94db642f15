//! Index statistics.
//!
//! A quick summary of what is indexed: chunk count, which collection and
//! database the numbers come from, the embedding model in use and how far
//! the index has caught up with history. Used by `vault-rag stats`.

use anyhow::Result;
use serde::Serialize;

use vault_rag_core::store::VectorStore;

use crate::state::StateStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub total_chunks: usize,
    pub collection_name: String,
    pub db_path: String,
    pub embedding_model: String,
    pub last_indexed_commit: Option<String>,
}

pub async fn run_stats<S, T>(store: &S, state: &T) -> Result<StatsReport>
where
    S: VectorStore + ?Sized,
    T: StateStore + ?Sized,
{
    let total_chunks = store.count().await?;
    let info = store.info();

    Ok(StatsReport {
        total_chunks,
        collection_name: info.collection_name,
        db_path: info.location,
        embedding_model: info.embedding_model,
        last_indexed_commit: state.last_indexed_commit()?,
    })
}
