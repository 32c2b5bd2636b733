use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::{DeletionReason, FeedType, FeedTypeSet, Item, TileRefs};

// ============================================================================
// Error Types
// ============================================================================

/// Item store errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("Another instance of pushpool appears to be using the database. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored row could not be decoded into an item
    #[error("Stored item '{uid}' is corrupt: {message}")]
    Corrupt { uid: String, message: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err.to_string()) {
            return StoreError::InstanceLocked;
        }
        StoreError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all mean
/// someone else has the file.
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for item queries (used by sqlx FromRow).
/// Set-valued columns hold JSON arrays.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub uid: String,
    pub title: String,
    pub portal_type: String,
    pub creator: String,
    pub modified: String,
    pub url: String,
    pub description: String,
    pub subject: String,
    pub category: Option<String>,
    pub feed_type: String,
    pub deletion_reason: Option<String>,
    pub tile_urls: String,
    pub deleted_tile_urls: String,
    pub content: String,
}

impl ItemRow {
    pub(crate) fn into_item(self) -> Result<Item, StoreError> {
        let uid = self.uid;
        let corrupt = |message: String| StoreError::Corrupt {
            uid: uid.clone(),
            message,
        };

        let modified = DateTime::parse_from_rfc3339(&self.modified)
            .map_err(|e| corrupt(format!("modified '{}': {}", self.modified, e)))?
            .with_timezone(&Utc);
        let feed_types: Vec<FeedType> =
            serde_json::from_str(&self.feed_type).map_err(|e| corrupt(format!("feed_type: {e}")))?;
        let subject: Vec<String> =
            serde_json::from_str(&self.subject).map_err(|e| corrupt(format!("subject: {e}")))?;
        let tile_urls: BTreeSet<String> = serde_json::from_str(&self.tile_urls)
            .map_err(|e| corrupt(format!("tile_urls: {e}")))?;
        let deleted_tile_urls: BTreeSet<String> = serde_json::from_str(&self.deleted_tile_urls)
            .map_err(|e| corrupt(format!("deleted_tile_urls: {e}")))?;
        let content: Vec<String> =
            serde_json::from_str(&self.content).map_err(|e| corrupt(format!("content: {e}")))?;

        Ok(Item {
            uid,
            title: self.title,
            portal_type: self.portal_type,
            creator: self.creator,
            modified,
            url: self.url,
            description: self.description,
            subject,
            category: self.category,
            feed_types: FeedTypeSet::from_types(
                feed_types,
                self.deletion_reason.map(DeletionReason::from),
            ),
            tiles: TileRefs::from_sets(tile_urls, deleted_tile_urls),
            content,
        })
    }
}
