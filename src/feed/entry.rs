use crate::model::FeedType;

/// A `<category>` on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub term: String,
    pub label: Option<String>,
}

impl Tag {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            label: None,
        }
    }

    pub fn labelled(term: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            label: Some(label.into()),
        }
    }
}

/// One entry of a parsed feed.
///
/// `None` means the element was absent and the corresponding item field is
/// left alone; `Some("")` is a present-but-empty element and does overwrite.
/// `updated` is kept as the raw text so a malformed timestamp can fail the
/// entry instead of being silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub link: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub updated: Option<String>,
    pub summary: Option<String>,
    pub content: Vec<String>,
    pub tags: Option<Vec<Tag>>,
    pub portal_type: Option<String>,
    pub deletion_type: Option<String>,
    pub tile_urls: Option<String>,
    pub deleted_tile_urls: Option<String>,
}

impl FeedEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A parsed feed submission.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// Link the origin was inferred from, if the feed had any link.
    pub feed_link: Option<String>,
    /// Which logical feed the submission came from.
    pub origin: Option<FeedType>,
    /// Entries in document order.
    pub entries: Vec<FeedEntry>,
}
