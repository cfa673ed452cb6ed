//! Domain types shared by the ingestion pipeline, the query interface and
//! the protocol server.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// One encyclopedia entry after text extraction.
///
/// - `entry_name`: stable identity (file stem / URL slug, e.g. `free-will`)
/// - `title`: `<title>` of the page, or the entry name title-cased
/// - `content`: whitespace-normalized main text
/// - `scraped_at`: modification time of the raw HTML file, if known
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub entry_name: String,
    pub title: String,
    pub filename: String,
    pub content: String,
    pub scraped_at: Option<String>,
}

/// A contiguous span of a document's text that is independently indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub title: String,
    pub filename: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content_hash: String,
}

impl DocumentChunk {
    pub fn make_id(doc_id: &str, chunk_index: usize) -> ChunkId { format!("{}_chunk_{}", doc_id, chunk_index) }
}

/// Stable content fingerprint used to skip re-embedding unchanged chunks.
pub fn content_hash(text: &str) -> String { blake3::hash(text.as_bytes()).to_hex().to_string() }

/// Source metadata returned alongside every search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub entry_name: String,
    pub title: String,
    pub filename: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// One nearest-neighbour hit. `score` is cosine similarity; higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: ChunkId,
    pub text: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub entry_count: usize,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub store_path: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub name: String,
    pub title: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryChunk {
    pub id: ChunkId,
    pub text: String,
    pub chunk_index: usize,
}

/// Every stored chunk of one entry, ordered by `chunk_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryContent {
    pub entry_name: String,
    pub title: String,
    pub chunks: Vec<EntryChunk>,
}

impl EntryContent {
    pub fn full_text(&self) -> String {
        self.chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n")
    }
}
