use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, StringArray, TimestampMillisecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

use philodb_core::types::DocumentChunk;

/// Column holding the entry name; the filter key for per-entry queries.
pub const DOC_ID: &str = "doc_id";
pub const VECTOR: &str = "vector";

/// Chunk table schema. `embedder_id` and `content_hash` decide whether a
/// chunk must be re-embedded on the next run.
pub fn build_chunks_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(DOC_ID, DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("total_chunks", DataType::Int32, false),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("embedder_id", DataType::Utf8, false),
        Field::new("processed_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

/// Vector width declared by an existing table, if it has a vector column.
pub fn vector_dim(schema: &Schema) -> Option<i32> {
    match schema.field_with_name(VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => Some(*n),
        _ => None,
    }
}

/// Build one record batch from chunks and their vectors (same order).
pub fn chunks_to_record_batch(
    chunks: &[&DocumentChunk],
    vectors: &[Vec<f32>],
    embedder_id: &str,
    dim: i32,
) -> anyhow::Result<RecordBatch> {
    anyhow::ensure!(chunks.len() == vectors.len(), "chunks and vectors length must match");
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim as usize) {
        anyhow::bail!("dim mismatch: got {} expected {}", bad.len(), dim);
    }
    let now = chrono::Utc::now().timestamp_millis();
    let n = chunks.len();
    let batch = RecordBatch::try_new(
        build_chunks_schema(dim),
        vec![
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.doc_id.as_str()))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.title.as_str()))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.filename.as_str()))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.content.as_str()))),
            Arc::new(Int32Array::from_iter_values(chunks.iter().map(|c| c.chunk_index as i32))),
            Arc::new(Int32Array::from_iter_values(chunks.iter().map(|c| c.total_chunks as i32))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.content_hash.as_str()))),
            Arc::new(StringArray::from_iter_values(std::iter::repeat(embedder_id).take(n))),
            Arc::new(TimestampMillisecondArray::from(vec![now; n])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>())),
                dim,
            )),
        ],
    )?;
    Ok(batch)
}
