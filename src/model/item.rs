use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::feed_type::FeedTypeSet;

/// Label marking the tag that names the originating site.
pub const SITE_TITLE_LABEL: &str = "Site Title";

// ============================================================================
// Item
// ============================================================================

/// A piece of content shared to the pool.
///
/// Field names on the wire follow the search index schema (`Title`,
/// `Creator`, ...), so serializing an item yields an index document once the
/// internal-only fields are stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub uid: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(default)]
    pub portal_type: String,
    #[serde(rename = "Creator", default)]
    pub creator: String,
    #[serde(rename = "Modified")]
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Subject", default)]
    pub subject: Vec<String>,
    #[serde(rename = "Category", default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub feed_types: FeedTypeSet,
    #[serde(flatten)]
    pub tiles: TileRefs,
    #[serde(default)]
    pub content: Vec<String>,
}

impl Item {
    /// A blank item with no feed membership, modified "now".
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            title: String::new(),
            portal_type: String::new(),
            creator: String::new(),
            modified: Utc::now(),
            url: String::new(),
            description: String::new(),
            subject: Vec::new(),
            category: None,
            feed_types: FeedTypeSet::new(),
            tiles: TileRefs::default(),
            content: Vec::new(),
        }
    }
}

// ============================================================================
// Tile References
// ============================================================================

/// Auxiliary sub-resources attached to an item.
///
/// A reference is never in both sets at once: every mutation moves it from
/// one side to the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRefs {
    #[serde(rename = "tile_urls", default)]
    tile_refs: BTreeSet<String>,
    #[serde(rename = "deleted_tile_urls", default)]
    deleted_tile_refs: BTreeSet<String>,
}

impl TileRefs {
    /// Build from two sets; anything in both is treated as deleted.
    pub fn from_sets(tile_refs: BTreeSet<String>, deleted_tile_refs: BTreeSet<String>) -> Self {
        let tile_refs = tile_refs.difference(&deleted_tile_refs).cloned().collect();
        Self {
            tile_refs,
            deleted_tile_refs,
        }
    }

    pub fn active(&self) -> &BTreeSet<String> {
        &self.tile_refs
    }

    pub fn deleted(&self) -> &BTreeSet<String> {
        &self.deleted_tile_refs
    }

    /// Union `incoming` into the active set, removing it from the deleted set.
    pub fn add_active(&mut self, incoming: BTreeSet<String>) {
        for tile in incoming {
            self.deleted_tile_refs.remove(&tile);
            self.tile_refs.insert(tile);
        }
    }

    /// Union `incoming` into the deleted set, removing it from the active set.
    pub fn add_deleted(&mut self, incoming: BTreeSet<String>) {
        for tile in incoming {
            self.tile_refs.remove(&tile);
            self.deleted_tile_refs.insert(tile);
        }
    }

    /// After a full removal the tiles that were live become the deleted set,
    /// so a later re-share can restore them.
    pub fn retire_all(&mut self) {
        self.deleted_tile_refs = std::mem::take(&mut self.tile_refs);
    }

    /// Render a set in the pipe-delimited wire format.
    pub fn join(set: &BTreeSet<String>) -> String {
        set.iter().map(String::as_str).collect::<Vec<_>>().join("|")
    }
}

/// Parse a pipe-delimited list of tile references.
///
/// Pieces are trimmed and empty pieces dropped, so `""` and `" | "` both
/// yield an empty set.
pub fn parse_tile_refs(raw: &str) -> BTreeSet<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}
