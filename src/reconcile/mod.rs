//! Bringing the item store and the search index into agreement.
//!
//! - [`entry`] - apply parsed feed entries to items
//! - [`view`] - per-feed views over the item collection
//! - [`deletion`] - explicit deletions and restoring items from `deleted`

pub mod deletion;
pub mod entry;
pub mod view;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

use crate::index::IndexError;
use crate::storage::StoreError;

pub use deletion::{
    delete_items, restore_from_deletion, restore_index_documents, restore_live_item,
    DeletionSummary, RestoreSummary,
};
pub use entry::{EntryOutcome, EntryReconciler, UpdateSummary};
pub use view::{combine, combine_from_store};

/// Prefix carried by syndication identifiers, including its separator.
const UID_PREFIX: &str = "urn:syndication:";

/// Failures that abort a whole submission.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Item store error: {0}")]
    Store(#[from] StoreError),

    #[error("Search index error: {0}")]
    Index(#[from] IndexError),
}

/// Failures confined to a single entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("malformed timestamp '{value}'")]
    Timestamp { value: String },
}

/// Strip the `urn:syndication:` prefix from an entry id.
pub fn normalize_uid(id: &str) -> &str {
    id.strip_prefix(UID_PREFIX).unwrap_or(id)
}

/// Naive layouts tried after RFC 3339 and RFC 2822, all read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an entry timestamp.
///
/// Accepts RFC 3339 (Atom), RFC 2822 (RSS), a naive date-time with a `T` or
/// space separator and optional fractional seconds, or a bare date
/// (midnight). Naive values are read as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, EntryError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_rfc2822(trimmed))
    {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
    {
        return Ok(dt.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| EntryError::Timestamp {
            value: value.to_string(),
        })
}
