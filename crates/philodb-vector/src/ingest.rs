//! Corpus ingestion: extract, chunk, embed changed chunks and upsert.
//!
//! Documents are processed one at a time. Any failure inside a document is
//! recorded in the [`IngestReport`] and the run moves on to the next file;
//! only failing to open the corpus directory or the store aborts the run.

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use philodb_core::config::Config;
use philodb_core::data_processor::DataProcessor;
use philodb_core::error::Error;
use philodb_core::traits::Embedder;
use philodb_core::types::DocumentChunk;

use crate::table::{ensure_chunks_table, open_db};
use crate::writer::ChunkWriter;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents_seen: usize,
    pub documents_indexed: usize,
    pub documents_unchanged: usize,
    pub chunks_written: usize,
    pub chunks_unchanged: usize,
    pub failures: Vec<DocumentFailure>,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        format!(
            "{} documents seen: {} indexed, {} unchanged, {} failed; {} chunks embedded, {} reused",
            self.documents_seen,
            self.documents_indexed,
            self.documents_unchanged,
            self.failures.len(),
            self.chunks_written,
            self.chunks_unchanged
        )
    }
}

enum DocOutcome {
    Indexed { written: usize, reused: usize },
    Unchanged { chunks: usize },
}

pub struct Vectorizer {
    config: Config,
    embedder: Box<dyn Embedder>,
    processor: DataProcessor,
    show_progress: bool,
}

impl Vectorizer {
    pub fn new(config: Config, embedder: Box<dyn Embedder>) -> Result<Self> {
        if embedder.dim() != config.embedding.dim {
            return Err(anyhow!("embedder dim {} does not match embedding.dim {}", embedder.dim(), config.embedding.dim));
        }
        let processor = DataProcessor::new(config.chunking.clone())?;
        Ok(Self { config, embedder, processor, show_progress: false })
    }

    /// Draw an indicatif bar on stderr while ingesting.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config { &self.config }

    /// Ingest every `*.html` under `html_dir` (at most `max_files`).
    pub async fn run(&self, html_dir: &Path, max_files: Option<usize>) -> Result<IngestReport> {
        let started = Instant::now();
        let files = self.processor.list_html_files(html_dir, max_files)?;
        let store_path = self.config.store_path();
        std::fs::create_dir_all(&store_path)
            .with_context(|| format!("creating store directory {}", store_path.display()))?;
        let conn = open_db(&store_path.to_string_lossy()).await?;
        let table = ensure_chunks_table(&conn, &self.config.store.table, self.embedder.dim()).await?;
        let writer = ChunkWriter::new(table, self.embedder.model_id(), self.embedder.dim())?;

        info!(files = files.len(), dir = %html_dir.display(), store = %store_path.display(), "ingesting corpus");
        let pb = if self.show_progress { ProgressBar::new(files.len() as u64) } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} entries ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut report = IngestReport { documents_seen: files.len(), ..IngestReport::default() };
        for path in &files {
            let filename = path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
            pb.set_message(filename.clone());
            match self.ingest_file(&writer, path).await {
                Ok(DocOutcome::Indexed { written, reused }) => {
                    report.documents_indexed += 1;
                    report.chunks_written += written;
                    report.chunks_unchanged += reused;
                }
                Ok(DocOutcome::Unchanged { chunks }) => {
                    report.documents_unchanged += 1;
                    report.chunks_unchanged += chunks;
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "skipping document");
                    report.failures.push(DocumentFailure { filename, error: e.to_string() });
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(elapsed_ms = started.elapsed().as_millis() as u64, rows = writer.count_rows().await?, "{}", report.summary());
        Ok(report)
    }

    async fn ingest_file(&self, writer: &ChunkWriter, path: &Path) -> Result<DocOutcome> {
        let doc = self.processor.load_document(path)?;
        let chunks = self.processor.chunk_document(&doc)?;
        if chunks.is_empty() {
            // previously indexed rows must not outlive an emptied page
            writer.delete_stale(&doc.entry_name, 0).await?;
            return Err(Error::Chunking { doc_id: doc.entry_name, reason: "no extractable text".into() }.into());
        }

        let existing = writer.existing_chunks(&doc.entry_name).await?;
        let embedder_id = writer.embedder_id();
        if existing.len() == chunks.len()
            && chunks.iter().all(|c| existing.get(&c.id).is_some_and(|s| s.identical_to(c, embedder_id)))
        {
            debug!(entry = %doc.entry_name, chunks = chunks.len(), "unchanged");
            return Ok(DocOutcome::Unchanged { chunks: chunks.len() });
        }

        let mut vectors: Vec<Option<Vec<f32>>> = chunks
            .iter()
            .map(|c| existing.get(&c.id).filter(|s| s.reusable_for(c, embedder_id)).map(|s| s.vector.clone()))
            .collect();
        let stale: Vec<usize> = vectors.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(i, _)| i).collect();
        for batch in stale.chunks(self.config.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].content.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).map_err(|e| Error::Embedding {
                doc_id: doc.entry_name.clone(),
                reason: e.to_string(),
            })?;
            if embedded.len() != texts.len() {
                return Err(Error::Embedding { doc_id: doc.entry_name.clone(), reason: "embedder returned wrong count".into() }.into());
            }
            for (&i, v) in batch.iter().zip(embedded) {
                vectors[i] = Some(v);
            }
        }
        let vectors: Vec<Vec<f32>> = vectors.into_iter().flatten().collect();
        let refs: Vec<&DocumentChunk> = chunks.iter().collect();

        writer.upsert(&refs, &vectors).await?;
        writer.delete_stale(&doc.entry_name, chunks.len()).await?;
        debug!(entry = %doc.entry_name, chunks = chunks.len(), embedded = stale.len(), "indexed");
        Ok(DocOutcome::Indexed { written: stale.len(), reused: chunks.len() - stale.len() })
    }
}
