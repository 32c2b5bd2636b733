//! Feed submission intake.
//!
//! - [`parser`] - Atom/RSS bytes into a [`ParsedFeed`] using `feed-rs`, plus a
//!   `quick-xml` pass for the `push:` extension elements
//! - [`content_type`] - gate on the submission's media type
//! - [`entry`] - the parsed entry model handed to the reconciler
//!
//! # Example
//!
//! ```ignore
//! use pushpool::feed::{ensure_content_type, parse_feed};
//!
//! ensure_content_type("application/atom+xml")?;
//! let parsed = parse_feed(&bytes)?;
//! for entry in &parsed.entries {
//!     println!("{} from {:?}", entry.id, parsed.origin);
//! }
//! ```

mod content_type;
mod entry;
mod parser;

use std::path::Path;
use thiserror::Error;

pub use content_type::{ensure_content_type, ALLOWED_CONTENT_TYPES};
pub use entry::{FeedEntry, ParsedFeed, Tag};
pub use parser::{origin_from_link, parse_feed};

/// Default cap on a submission's size.
pub const MAX_FEED_SIZE: u64 = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Error)]
pub enum FeedError {
    /// Submission media type is not Atom or RSS
    #[error(
        "The content-type of the request must be one of the following: {allowed} (got '{0}')",
        allowed = ALLOWED_CONTENT_TYPES.join(", ")
    )]
    UnsupportedContentType(String),
    /// Document could not be parsed as a feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Extension scan hit malformed XML
    #[error("XML error: {0}")]
    Xml(String),
    /// Submission exceeded the configured size limit
    #[error("Feed is {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },
    #[error("Failed to read feed: {0}")]
    Io(#[from] std::io::Error),
}

/// Read a feed submission from disk, refusing files over `max_bytes`.
pub async fn read_feed(path: &Path, max_bytes: u64) -> Result<Vec<u8>, FeedError> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > max_bytes {
        return Err(FeedError::TooLarge {
            size: metadata.len(),
            max: max_bytes,
        });
    }
    Ok(tokio::fs::read(path).await?)
}
