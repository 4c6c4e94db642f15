//! SQLite-backed [`VectorStore`].
//!
//! Chunks live in one table together with their embedding BLOBs. Vectors
//! are computed through an [`Embedder`] and memoized in `embedding_cache`
//! by `(content hash, model)`, so re-adding unchanged text (a re-run, or a
//! rename) never calls the embedder again. Search loads every vector and
//! ranks by cosine distance in process.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use vault_rag_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob, Embedder};
use vault_rag_core::models::{Chunk, ChunkMetadata, HitMetadata, SearchHit};
use vault_rag_core::store::{StoreInfo, VectorStore};

use crate::db;
use crate::migrate;

pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Box<dyn Embedder>,
    collection: String,
    db_path: PathBuf,
    batch_size: usize,
}

impl SqliteStore {
    /// Open the index at `db_path`, creating the schema if needed.
    pub async fn open(
        db_path: &Path,
        collection: &str,
        embedder: Box<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        migrate::run_migrations(&pool)
            .await
            .context("Failed to create index schema")?;
        Ok(Self {
            pool,
            embedder,
            collection: collection.to_string(),
            db_path: db_path.to_path_buf(),
            batch_size: batch_size.max(1),
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Vectors for `chunks` in order, from the cache where possible.
    async fn vectors_for(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let model = self.embedder.model_name().to_string();
        let dims = self.embedder.dims();
        let mut by_hash: HashMap<String, Vec<f32>> = HashMap::new();

        let unique: HashSet<&str> = chunks.iter().map(|c| c.hash.as_str()).collect();
        for hash in &unique {
            let row = sqlx::query("SELECT embedding FROM embedding_cache WHERE hash = ? AND model = ?")
                .bind(*hash)
                .bind(&model)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                let vector = blob_to_vec(&row.get::<Vec<u8>, _>("embedding"));
                if vector.len() == dims {
                    by_hash.insert(hash.to_string(), vector);
                }
            }
        }

        let mut seen = HashSet::new();
        let misses: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| !by_hash.contains_key(&c.hash) && seen.insert(c.hash.as_str()))
            .collect();
        debug!(
            chunks = chunks.len(),
            cached = by_hash.len(),
            to_embed = misses.len(),
            "resolving chunk vectors"
        );

        for batch in misses.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(anyhow!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                ));
            }

            let now = chrono::Utc::now().timestamp();
            for (chunk, vector) in batch.iter().zip(vectors) {
                sqlx::query(
                    r#"
                    INSERT INTO embedding_cache (hash, model, dims, embedding, created_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(hash, model) DO UPDATE SET
                        dims = excluded.dims,
                        embedding = excluded.embedding,
                        created_at = excluded.created_at
                    "#,
                )
                .bind(&chunk.hash)
                .bind(&model)
                .bind(vector.len() as i64)
                .bind(vec_to_blob(&vector))
                .bind(now)
                .execute(&self.pool)
                .await?;
                by_hash.insert(chunk.hash.clone(), vector);
            }
        }

        chunks
            .iter()
            .map(|c| {
                by_hash
                    .get(&c.hash)
                    .cloned()
                    .ok_or_else(|| anyhow!("no vector for chunk {}", c.id()))
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let vectors = self.vectors_for(chunks).await?;

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(&vectors) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, file_path, chunk_index, content, heading,
                                    heading_level, metadata_json, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(file_path, chunk_index) DO UPDATE SET
                    content = excluded.content,
                    heading = excluded.heading,
                    heading_level = excluded.heading_level,
                    metadata_json = excluded.metadata_json,
                    hash = excluded.hash,
                    embedding = excluded.embedding
                "#,
            )
            .bind(chunk.id())
            .bind(&chunk.file_path)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.content)
            .bind(&chunk.heading)
            .bind(chunk.heading_level as i64)
            .bind(metadata_json)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(chunks.len())
    }

    async fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE file_path = ?")
            .bind(file_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self.embedder.embed(query).await?;

        let rows = match file_filter {
            Some(filter) => {
                sqlx::query(
                    r#"
                    SELECT file_path, chunk_index, content, heading, metadata_json, embedding
                    FROM chunks
                    WHERE instr(file_path, ?) > 0
                    "#,
                )
                .bind(filter)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT file_path, chunk_index, content, heading, metadata_json, embedding FROM chunks",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let file_path: String = row.get("file_path");
            let metadata: ChunkMetadata =
                match serde_json::from_str(row.get::<&str, _>("metadata_json")) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!(file = %file_path, error = %e, "corrupt chunk metadata, ignoring it");
                        ChunkMetadata::default()
                    }
                };
            let vector = blob_to_vec(&row.get::<Vec<u8>, _>("embedding"));
            hits.push(SearchHit {
                file_path,
                chunk_index: row.get::<i64, _>("chunk_index") as usize,
                content: row.get("content"),
                distance: cosine_distance(&query_vec, &vector),
                metadata: HitMetadata {
                    title: metadata.title,
                    tags: metadata.tags.into_iter().collect(),
                    heading: row.get("heading"),
                },
            });
        }

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
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn prune(&self) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM embedding_cache WHERE hash NOT IN (SELECT DISTINCT hash FROM chunks)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    fn info(&self) -> StoreInfo {
        StoreInfo {
            collection_name: self.collection.clone(),
            location: self.db_path.display().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tempfile::TempDir;
    use vault_rag_core::chunk::{chunk_markdown, ChunkingParams};
    use vault_rag_core::embedding::HashEmbedder;

    struct CountingEmbedder {
        inner: HashEmbedder,
        texts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    async fn open(tmp: &TempDir) -> (SqliteStore, Arc<AtomicUsize>) {
        let texts = Arc::new(AtomicUsize::new(0));
        let embedder = CountingEmbedder {
            inner: HashEmbedder::new(256),
            texts: texts.clone(),
        };
        let store = SqliteStore::open(
            &tmp.path().join("rag_db").join("index.sqlite"),
            "obsidian_vault",
            Box::new(embedder),
            2,
        )
        .await
        .unwrap();
        (store, texts)
    }

    fn note(path: &str, sections: usize) -> Vec<Chunk> {
        let para = "Plenty of words so this section stays a chunk of its own in the index. ".repeat(2);
        let raw = (0..sections)
            .map(|i| format!("# Part {i}\n\n{para} topic{i}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        chunk_markdown(path, &raw, ChunkingParams::default())
    }

    #[tokio::test]
    async fn test_add_count_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(&tmp).await;
        assert_eq!(store.add(&note("a.md", 3)).await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 3);
        store.close().await;

        let (store, _) = open(&tmp).await;
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_replace_file_and_delete() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(&tmp).await;
        store.add(&note("a.md", 3)).await.unwrap();
        store.add(&note("b.md", 2)).await.unwrap();

        let (deleted, added) = store.replace_file("a.md", &note("a.md", 1)).await.unwrap();
        assert_eq!((deleted, added), (3, 1));
        assert_eq!(store.count().await.unwrap(), 3);

        assert_eq!(store.delete_by_file("b.md").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rename_reuses_cached_vectors() {
        let tmp = TempDir::new().unwrap();
        let (store, texts) = open(&tmp).await;
        store.add(&note("old.md", 3)).await.unwrap();
        assert_eq!(texts.load(Ordering::SeqCst), 3);

        store.delete_by_file("old.md").await.unwrap();
        store.add(&note("new.md", 3)).await.unwrap();
        assert_eq!(texts.load(Ordering::SeqCst), 3);

        store.clear().await.unwrap();
        store.add(&note("new.md", 3)).await.unwrap();
        assert_eq!(texts.load(Ordering::SeqCst), 3);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_search_filter_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(&tmp).await;
        let raw = "---\ntitle: Baking\ntags: [food]\n---\n# Bread\n\nsourdough starter hydration notes #kitchen";
        store
            .add(&chunk_markdown("notes/a.md", raw, ChunkingParams::default()))
            .await
            .unwrap();
        store.add(&note("notes/b.md", 2)).await.unwrap();

        let hits = store.search("sourdough", 5, Some("notes/a")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "notes/a.md");
        assert_eq!(hits[0].metadata.title, "Baking");
        assert_eq!(hits[0].metadata.heading, "Bread");
        assert_eq!(hits[0].metadata.tags, vec!["food", "kitchen"]);

        let all = store.search("sourdough", 10, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].file_path, "notes/a.md");
    }

    async fn cached_vectors(store: &SqliteStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_prune_drops_unreferenced_vectors() {
        let tmp = TempDir::new().unwrap();
        let (store, texts) = open(&tmp).await;
        store.add(&note("a.md", 3)).await.unwrap();
        store.add(&note("b.md", 1)).await.unwrap();
        assert_eq!(cached_vectors(&store).await, 3);

        store.delete_by_file("a.md").await.unwrap();
        assert_eq!(store.prune().await.unwrap(), 2);
        assert_eq!(cached_vectors(&store).await, 1);
        assert_eq!(store.prune().await.unwrap(), 0);

        // Still-referenced vectors survive and are reused.
        let before = texts.load(Ordering::SeqCst);
        store.add(&note("c.md", 1)).await.unwrap();
        assert_eq!(texts.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_still_returns_hit() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(&tmp).await;
        store.add(&note("a.md", 1)).await.unwrap();
        sqlx::query("UPDATE chunks SET metadata_json = '{not json'")
            .execute(&store.pool)
            .await
            .unwrap();

        let hits = store.search("words", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.title, "");
        assert_eq!(hits[0].metadata.heading, "Part 0");
    }

    #[tokio::test]
    async fn test_clear_and_info() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(&tmp).await;
        store.add(&note("a.md", 2)).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.clear().await.unwrap(), 0);

        let info = store.info();
        assert_eq!(info.collection_name, "obsidian_vault");
        assert!(info.location.ends_with("index.sqlite"));
        assert_eq!(info.embedding_model, "hash-fnv1a-256");
    }
}
