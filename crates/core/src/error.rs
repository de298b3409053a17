//! Error types shared across the workspace

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown regulation: {0}")]
    UnknownSource(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Encoder produces {actual}-dimensional vectors, index expects {expected}")]
    IncompatibleEncoder { expected: usize, actual: usize },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Index not loaded")]
    NotLoaded,

    #[error("Index must be rebuilt: {0}")]
    RebuildRequired(String),

    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
