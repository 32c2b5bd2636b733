//! Search index over pool items.
//!
//! The reconciler only needs three calls (search, update, delete by key), so
//! [`SearchIndex`] is kept that small. [`SqliteIndex`] is the local
//! implementation backed by SQLite FTS5.

mod document;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use document::{IndexDocument, INTERNAL_FIELDS, SCHEMA_FIELDS};
pub use sqlite::{IndexConsistencyReport, SqliteIndex};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Document {position} in batch has no uid")]
    MissingKey { position: usize },

    #[error("Document '{uid}' has field '{field}' which is not in the index schema")]
    UnknownField { uid: String, field: String },

    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    #[error("Corrupt index document: {0}")]
    Corrupt(String),

    #[error("Index database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What to look up in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexQuery {
    /// Every document stored under this uid.
    Uid(String),
    /// Full-text match over title and description.
    Text(String),
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexDocument>, IndexError>;

    /// Add or replace documents. Either the whole batch is accepted or none of it.
    async fn update(&self, documents: Vec<IndexDocument>) -> Result<(), IndexError>;

    /// Remove all documents for a uid. Unknown uids are not an error.
    async fn delete_by_key(&self, uid: &str) -> Result<(), IndexError>;
}
