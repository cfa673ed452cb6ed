use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Chunking failed for '{doc_id}': {reason}")]
    Chunking { doc_id: String, reason: String },

    #[error("Embedding failed for '{doc_id}': {reason}")]
    Embedding { doc_id: String, reason: String },

    /// The vector store directory is missing or cannot be opened.
    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Vector store operation failed: {0}")]
    Store(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn store(err: impl std::fmt::Display) -> Self { Self::Store(err.to_string()) }

    pub fn invalid_argument(msg: impl Into<String>) -> Self { Self::InvalidArgument(msg.into()) }
}

pub type Result<T> = std::result::Result<T, Error>;
