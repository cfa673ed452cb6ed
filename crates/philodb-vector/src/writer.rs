use anyhow::Result;
use arrow_array::RecordBatchIterator;
use lancedb::Table;
use std::collections::HashMap;

use philodb_core::types::DocumentChunk;

use crate::schema::{chunks_to_record_batch, DOC_ID, VECTOR};
use crate::table::{int_column, scan, sql_literal, string_column, vector_at};

/// What is already stored for one chunk id.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub content_hash: String,
    pub embedder_id: String,
    pub title: String,
    pub total_chunks: usize,
    pub vector: Vec<f32>,
}

impl StoredChunk {
    /// The stored vector is still valid for `chunk` under `embedder_id`.
    pub fn reusable_for(&self, chunk: &DocumentChunk, embedder_id: &str) -> bool {
        self.content_hash == chunk.content_hash && self.embedder_id == embedder_id
    }

    /// Nothing about the row would change if `chunk` were written again.
    pub fn identical_to(&self, chunk: &DocumentChunk, embedder_id: &str) -> bool {
        self.reusable_for(chunk, embedder_id) && self.title == chunk.title && self.total_chunks == chunk.total_chunks
    }
}

/// Idempotent writer for the chunk table, keyed by chunk id.
pub struct ChunkWriter {
    table: Table,
    embedder_id: String,
    dim: i32,
}

impl ChunkWriter {
    pub fn new(table: Table, embedder_id: &str, dim: usize) -> Result<Self> {
        Ok(Self { table, embedder_id: embedder_id.to_string(), dim: i32::try_from(dim)? })
    }

    pub fn embedder_id(&self) -> &str { &self.embedder_id }

    /// Rows already stored for `doc_id`, keyed by chunk id.
    pub async fn existing_chunks(&self, doc_id: &str) -> Result<HashMap<String, StoredChunk>> {
        let filter = format!("{} = {}", DOC_ID, sql_literal(doc_id));
        let batches = scan(
            &self.table,
            Some(&filter),
            &["id", "content_hash", "embedder_id", "title", "total_chunks", VECTOR],
        )
        .await?;
        let mut out = HashMap::new();
        for batch in &batches {
            let ids = string_column(batch, "id")?;
            let hashes = string_column(batch, "content_hash")?;
            let embedders = string_column(batch, "embedder_id")?;
            let titles = string_column(batch, "title")?;
            let totals = int_column(batch, "total_chunks")?;
            for i in 0..batch.num_rows() {
                out.insert(
                    ids.value(i).to_string(),
                    StoredChunk {
                        content_hash: hashes.value(i).to_string(),
                        embedder_id: embedders.value(i).to_string(),
                        title: titles.value(i).to_string(),
                        total_chunks: totals.value(i).max(0) as usize,
                        vector: vector_at(batch, VECTOR, i)?,
                    },
                );
            }
        }
        Ok(out)
    }

    /// Insert or replace rows by id.
    pub async fn upsert(&self, chunks: &[&DocumentChunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = chunks_to_record_batch(chunks, vectors, &self.embedder_id, self.dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let mut mi = self.table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await?;
        Ok(())
    }

    /// Drop rows of `doc_id` past its current chunk count (the entry shrank).
    pub async fn delete_stale(&self, doc_id: &str, total_chunks: usize) -> Result<()> {
        let predicate = format!("{} = {} AND chunk_index >= {}", DOC_ID, sql_literal(doc_id), total_chunks);
        self.table.delete(&predicate).await?;
        Ok(())
    }

    pub async fn count_rows(&self) -> Result<usize> { Ok(self.table.count_rows(None).await?) }
}
