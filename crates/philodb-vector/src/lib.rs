//! LanceDB-backed chunk store: ingestion on the write side, [`QueryService`]
//! on the read side.

pub mod ingest;
pub mod query;
pub mod schema;
pub mod table;
pub mod writer;

pub use ingest::{DocumentFailure, IngestReport, Vectorizer};
pub use query::QueryService;
pub use writer::ChunkWriter;
