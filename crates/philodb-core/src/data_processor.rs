//! Corpus enumeration and per-document extract + chunk.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::chunker::split_text;
use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::html::HtmlExtractor;
use crate::types::{content_hash, Document, DocumentChunk};

pub struct DataProcessor {
    chunking: ChunkingConfig,
    extractor: HtmlExtractor,
}

impl DataProcessor {
    pub fn new(chunking: ChunkingConfig) -> Result<Self> {
        chunking.validate()?;
        Ok(Self { chunking, extractor: HtmlExtractor::new() })
    }

    pub fn chunking(&self) -> &ChunkingConfig { &self.chunking }

    /// `*.html` files directly under `root`, sorted by path, at most `limit`.
    pub fn list_html_files(&self, root: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("corpus directory {} not found", root.display()),
            )));
        }
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("html"))
            .collect();
        files.sort();
        if let Some(limit) = limit {
            files.truncate(limit);
        }
        Ok(files)
    }

    /// Read (lossy UTF-8) and extract one page. `scraped_at` is the file's mtime.
    pub fn load_document(&self, path: &Path) -> Result<Document> {
        let raw = read_file_content(path)?;
        let filename = path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
        let mut doc = self.extractor.extract(&raw, &filename);
        doc.scraped_at = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());
        debug!(entry = %doc.entry_name, chars = doc.content.chars().count(), "extracted");
        Ok(doc)
    }

    /// Split a document into chunks with stable ids and content hashes.
    /// A document without text yields no chunks.
    pub fn chunk_document(&self, doc: &Document) -> Result<Vec<DocumentChunk>> {
        let pieces = split_text(&doc.content, &self.chunking).map_err(|e| Error::Chunking {
            doc_id: doc.entry_name.clone(),
            reason: e.to_string(),
        })?;
        let total_chunks = pieces.len();
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| DocumentChunk {
                id: DocumentChunk::make_id(&doc.entry_name, chunk_index),
                doc_id: doc.entry_name.clone(),
                title: doc.title.clone(),
                filename: doc.filename.clone(),
                content: text.to_string(),
                chunk_index,
                total_chunks,
                content_hash: content_hash(text),
            })
            .collect())
    }
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).into_owned()),
    }
}
