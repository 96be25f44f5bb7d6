//! Engine error taxonomy.
//!
//! Configuration problems fail fast at construction. Per-file extraction
//! and embedding failures are recorded on the file record and never abort
//! an indexing run; only store-level failures propagate.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open store at {path}: {source}")]
    StoreOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("schema migration to version {version} failed: {source}. Delete the index database and re-index.")]
    SchemaMigration {
        version: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("embedding for symbol {symbol_id} has {actual} dimensions, store expects {expected}")]
    SerializeEmbedding {
        symbol_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("indexing already in progress")]
    IndexingInProgress,

    #[error("extraction failed for {path}: {message}")]
    Extract { path: String, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("store query failed: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
