//! Read side of the store: semantic search, stats, listing and entry lookup.

use arrow_array::{Float32Array, RecordBatch};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use philodb_core::config::Config;
use philodb_core::error::{Error, Result};
use philodb_core::traits::{Embedder, RetrievalBackend};
use philodb_core::types::{ChunkMetadata, EntryChunk, EntryContent, EntrySummary, SearchResult, StoreStats};
use philodb_embed::{get_default_embedder, use_fake_embeddings, FAKE_MODEL_ID};

use crate::schema::{DOC_ID, VECTOR};
use crate::table::{int_column, open_db, open_table_if_exists, scan, sql_literal, string_column};

/// Owns the store connection and the query embedder, both opened on first use.
pub struct QueryService {
    config: Config,
    store_path: PathBuf,
    conn: OnceCell<Connection>,
    embedder: OnceCell<Box<dyn Embedder>>,
}

impl QueryService {
    /// Fails with `StoreUnavailable` when the store directory does not exist.
    pub fn open(config: Config) -> Result<Self> {
        let store_path = config.store_path();
        if !store_path.is_dir() {
            return Err(Error::StoreUnavailable(format!(
                "no vector store at {}; run philodb-vectorize first or set APP_STORE__PATH",
                store_path.display()
            )));
        }
        Ok(Self { config, store_path, conn: OnceCell::new(), embedder: OnceCell::new() })
    }

    pub fn config(&self) -> &Config { &self.config }

    /// Release the connection and the model.
    pub fn shutdown(self) {
        info!(store = %self.store_path.display(), "query service shut down");
        drop(self);
    }

    async fn connection(&self) -> Result<&Connection> {
        self.conn
            .get_or_try_init(|| async {
                debug!(store = %self.store_path.display(), "opening vector store");
                open_db(&self.store_path.to_string_lossy()).await.map_err(|e| Error::StoreUnavailable(e.to_string()))
            })
            .await
    }

    async fn embedder(&self) -> Result<&dyn Embedder> {
        let embedder = self
            .embedder
            .get_or_try_init(|| async {
                let model_dir = self.config.model_dir();
                let cfg = self.config.embedding.clone();
                let load_failed = |reason: String| Error::Embedding { doc_id: "<query>".into(), reason };
                // tokenizer and weights are read from disk
                tokio::task::spawn_blocking(move || get_default_embedder(&cfg, model_dir.as_deref()))
                    .await
                    .map_err(|e| load_failed(e.to_string()))?
                    .map_err(|e| load_failed(e.to_string()))
            })
            .await?;
        Ok(embedder.as_ref())
    }

    async fn table(&self) -> Result<Option<Table>> {
        let conn = self.connection().await?;
        open_table_if_exists(conn, &self.config.store.table).await.map_err(Error::store)
    }

    pub async fn search(&self, query: &str, k: usize, entry_filter: Option<&str>) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::invalid_argument("query must not be empty"));
        }
        if k == 0 || k > self.config.search.max_k {
            return Err(Error::invalid_argument(format!("k must be between 1 and {}", self.config.search.max_k)));
        }
        let Some(table) = self.table().await? else { return Ok(Vec::new()) };
        if table.count_rows(None).await.map_err(Error::store)? == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder()
            .await?
            .embed_one(query)
            .map_err(|e| Error::Embedding { doc_id: "<query>".into(), reason: e.to_string() })?;
        if vector.iter().all(|x| *x == 0.0) {
            // nothing to compare against under cosine distance
            return Ok(Vec::new());
        }

        let mut q = table.vector_search(vector).map_err(Error::store)?.column(VECTOR).distance_type(DistanceType::Cosine).limit(k);
        if let Some(entry) = entry_filter.filter(|e| !e.trim().is_empty()) {
            q = q.only_if(format!("{} = {}", DOC_ID, sql_literal(entry)));
        }
        let batches: Vec<RecordBatch> = q.execute().await.map_err(Error::store)?.try_collect().await.map_err(Error::store)?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(hits_from_batch(batch).map_err(Error::store)?);
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        debug!(query, k, hits = results.len(), "search");
        Ok(results)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats {
            entry_count: 0,
            chunk_count: 0,
            embedding_model: self.configured_model().to_string(),
            store_path: self.store_path.display().to_string(),
            table: self.config.store.table.clone(),
        };
        let Some(table) = self.table().await? else { return Ok(stats) };
        stats.chunk_count = table.count_rows(None).await.map_err(Error::store)?;

        let batches = scan(&table, None, &[DOC_ID, "embedder_id"]).await.map_err(Error::store)?;
        let mut entries = HashSet::new();
        let mut models = BTreeMap::<String, usize>::new();
        for batch in &batches {
            let docs = string_column(batch, DOC_ID).map_err(Error::store)?;
            let embedders = string_column(batch, "embedder_id").map_err(Error::store)?;
            for i in 0..batch.num_rows() {
                entries.insert(docs.value(i).to_string());
                *models.entry(embedders.value(i).to_string()).or_default() += 1;
            }
        }
        stats.entry_count = entries.len();
        if let Some((model, _)) = models.into_iter().max_by_key(|(_, n)| *n) {
            stats.embedding_model = model;
        }
        Ok(stats)
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<EntrySummary>> {
        if limit == 0 {
            return Err(Error::invalid_argument("limit must be at least 1"));
        }
        let Some(table) = self.table().await? else { return Ok(Vec::new()) };
        let batches = scan(&table, None, &[DOC_ID, "title"]).await.map_err(Error::store)?;
        let mut entries: BTreeMap<String, (String, usize)> = BTreeMap::new();
        for batch in &batches {
            let docs = string_column(batch, DOC_ID).map_err(Error::store)?;
            let titles = string_column(batch, "title").map_err(Error::store)?;
            for i in 0..batch.num_rows() {
                let slot = entries.entry(docs.value(i).to_string()).or_insert_with(|| (titles.value(i).to_string(), 0));
                slot.1 += 1;
            }
        }
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(name, (title, chunks))| EntrySummary { name, title, chunks })
            .collect())
    }

    pub async fn get_entry(&self, entry_name: &str) -> Result<Option<EntryContent>> {
        if entry_name.trim().is_empty() {
            return Err(Error::invalid_argument("entry_name must not be empty"));
        }
        let Some(table) = self.table().await? else { return Ok(None) };
        let filter = format!("{} = {}", DOC_ID, sql_literal(entry_name));
        let batches = scan(&table, Some(&filter), &["id", "title", "content", "chunk_index"]).await.map_err(Error::store)?;

        let mut title = None;
        let mut chunks = Vec::new();
        for batch in &batches {
            let ids = string_column(batch, "id").map_err(Error::store)?;
            let titles = string_column(batch, "title").map_err(Error::store)?;
            let contents = string_column(batch, "content").map_err(Error::store)?;
            let indices = int_column(batch, "chunk_index").map_err(Error::store)?;
            for i in 0..batch.num_rows() {
                title.get_or_insert_with(|| titles.value(i).to_string());
                chunks.push(EntryChunk {
                    id: ids.value(i).to_string(),
                    text: contents.value(i).to_string(),
                    chunk_index: indices.value(i).max(0) as usize,
                });
            }
        }
        let Some(title) = title else { return Ok(None) };
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(Some(EntryContent { entry_name: entry_name.to_string(), title, chunks }))
    }

    fn configured_model(&self) -> &str {
        if use_fake_embeddings(&self.config.embedding) { FAKE_MODEL_ID } else { &self.config.embedding.model_id }
    }
}

fn hits_from_batch(batch: &RecordBatch) -> anyhow::Result<Vec<SearchResult>> {
    let ids = string_column(batch, "id")?;
    let docs = string_column(batch, DOC_ID)?;
    let titles = string_column(batch, "title")?;
    let filenames = string_column(batch, "filename")?;
    let contents = string_column(batch, "content")?;
    let indices = int_column(batch, "chunk_index")?;
    let totals = int_column(batch, "total_chunks")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| anyhow::anyhow!("_distance column missing"))?;

    Ok((0..batch.num_rows())
        .map(|i| SearchResult {
            id: ids.value(i).to_string(),
            text: contents.value(i).to_string(),
            score: 1.0 - distances.value(i),
            metadata: ChunkMetadata {
                entry_name: docs.value(i).to_string(),
                title: titles.value(i).to_string(),
                filename: filenames.value(i).to_string(),
                chunk_index: indices.value(i).max(0) as usize,
                total_chunks: totals.value(i).max(0) as usize,
            },
        })
        .collect())
}

#[async_trait::async_trait]
impl RetrievalBackend for QueryService {
    async fn search(&self, query: &str, k: usize, entry_filter: Option<&str>) -> Result<Vec<SearchResult>> {
        QueryService::search(self, query, k, entry_filter).await
    }

    async fn stats(&self) -> Result<StoreStats> { QueryService::stats(self).await }

    async fn list(&self, limit: usize) -> Result<Vec<EntrySummary>> { QueryService::list(self, limit).await }

    async fn get_entry(&self, entry_name: &str) -> Result<Option<EntryContent>> {
        QueryService::get_entry(self, entry_name).await
    }

    fn default_k(&self) -> usize { self.config.search.default_k }
}
