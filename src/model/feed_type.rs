use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Feed Types
// ============================================================================

/// One of the three logical feeds an item can belong to.
///
/// Doubles as the origin of a notification: the feed an entry arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Shared,
    Selected,
    Deleted,
}

impl FeedType {
    pub const ALL: [FeedType; 3] = [FeedType::Shared, FeedType::Selected, FeedType::Deleted];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedType::Shared => "shared",
            FeedType::Selected => "selected",
            FeedType::Deleted => "deleted",
        }
    }

    /// Infer the origin feed from a feed link.
    ///
    /// The checks run in a fixed order (shared, deleted, selected) so a link
    /// such as `/shared/deleted.xml` resolves to `Shared`.
    pub fn from_feed_link(link: &str) -> Option<FeedType> {
        let link = link.to_ascii_lowercase();
        [FeedType::Shared, FeedType::Deleted, FeedType::Selected]
            .into_iter()
            .find(|feed_type| link.contains(feed_type.as_str()))
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown feed type '{0}' (expected shared, selected or deleted)")]
pub struct UnknownFeedType(pub String);

impl FromStr for FeedType {
    type Err = UnknownFeedType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(FeedType::Shared),
            "selected" => Ok(FeedType::Selected),
            "deleted" => Ok(FeedType::Deleted),
            other => Err(UnknownFeedType(other.to_string())),
        }
    }
}

// ============================================================================
// Deletion Reason
// ============================================================================

/// Why an item entered the `deleted` state.
///
/// `Featured` means the item was fully unfeatured and collapses every other
/// state. `Unspecified` is recorded when a deletion carries no reason at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeletionReason {
    Shared,
    Selected,
    Featured,
    Other(String),
    Unspecified,
}

impl DeletionReason {
    /// Interpret the `push:deletion_type` hint of an entry.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(str::trim) {
            None | Some("") => DeletionReason::Unspecified,
            Some(value) => DeletionReason::from(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeletionReason::Shared => "shared",
            DeletionReason::Selected => "selected",
            DeletionReason::Featured => "featured",
            DeletionReason::Other(reason) => reason,
            DeletionReason::Unspecified => "",
        }
    }
}

impl From<String> for DeletionReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "shared" => DeletionReason::Shared,
            "selected" => DeletionReason::Selected,
            "featured" => DeletionReason::Featured,
            "" => DeletionReason::Unspecified,
            _ => DeletionReason::Other(value),
        }
    }
}

impl From<DeletionReason> for String {
    fn from(value: DeletionReason) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DeletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionReason::Unspecified => f.write_str("unspecified"),
            other => f.write_str(other.as_str()),
        }
    }
}

// ============================================================================
// FeedTypeSet
// ============================================================================

/// The set of feeds an item currently belongs to.
///
/// Membership in `deleted` is represented by the presence of a
/// [`DeletionReason`], so "reason is set iff the item is deleted" cannot be
/// violated. The `selected ⟹ shared` rule is upheld by
/// [`transition::apply`](super::transition::apply) rather than the type,
/// since previously persisted data may not satisfy it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FeedTypeSetRepr", into = "FeedTypeSetRepr")]
pub struct FeedTypeSet {
    shared: bool,
    selected: bool,
    deletion: Option<DeletionReason>,
}

impl FeedTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from explicit membership flags.
    pub fn from_parts(shared: bool, selected: bool, deletion: Option<DeletionReason>) -> Self {
        Self {
            shared,
            selected,
            deletion,
        }
    }

    /// Build a set from a list of feed types and an optional reason.
    ///
    /// A `deleted` member without a reason gets `Unspecified`; a reason
    /// without a `deleted` member is dropped.
    pub fn from_types<I>(types: I, reason: Option<DeletionReason>) -> Self
    where
        I: IntoIterator<Item = FeedType>,
    {
        let mut set = Self::new();
        let mut deleted = false;
        for feed_type in types {
            match feed_type {
                FeedType::Shared => set.shared = true,
                FeedType::Selected => set.selected = true,
                FeedType::Deleted => deleted = true,
            }
        }
        if deleted {
            set.deletion = Some(reason.unwrap_or(DeletionReason::Unspecified));
        }
        set
    }

    pub fn contains(&self, feed_type: FeedType) -> bool {
        match feed_type {
            FeedType::Shared => self.shared,
            FeedType::Selected => self.selected,
            FeedType::Deleted => self.deletion.is_some(),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    pub fn deletion_reason(&self) -> Option<&DeletionReason> {
        self.deletion.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        !self.shared && !self.selected && self.deletion.is_none()
    }

    /// True when the item was removed with a `featured` deletion.
    pub fn is_featured_deletion(&self) -> bool {
        matches!(self.deletion, Some(DeletionReason::Featured))
    }

    /// True when `deleted` is the only member, i.e. after a full removal.
    pub fn is_fully_removed(&self) -> bool {
        !self.shared && !self.selected && self.deletion.is_some()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Members in a fixed order: shared, selected, deleted.
    pub fn iter(&self) -> impl Iterator<Item = FeedType> + '_ {
        FeedType::ALL
            .into_iter()
            .filter(move |feed_type| self.contains(*feed_type))
    }

    pub(crate) fn set_shared(&mut self, value: bool) {
        self.shared = value;
    }

    pub(crate) fn set_selected(&mut self, value: bool) {
        self.selected = value;
    }

    pub(crate) fn mark_deleted(&mut self, reason: DeletionReason) {
        self.deletion = Some(reason);
    }

    /// Drop `deleted` together with its reason. Returns whether anything changed.
    pub fn clear_deletion(&mut self) -> bool {
        self.deletion.take().is_some()
    }
}

impl fmt::Display for FeedTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(FeedType::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))?;
        if let Some(reason) = &self.deletion {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

/// Serialized shape shared by the item store and index documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeedTypeSetRepr {
    #[serde(default)]
    feed_type: Vec<FeedType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deletion_reason: Option<DeletionReason>,
}

impl From<FeedTypeSet> for FeedTypeSetRepr {
    fn from(set: FeedTypeSet) -> Self {
        Self {
            feed_type: set.iter().collect(),
            deletion_reason: set.deletion,
        }
    }
}

impl From<FeedTypeSetRepr> for FeedTypeSet {
    fn from(repr: FeedTypeSetRepr) -> Self {
        FeedTypeSet::from_types(repr.feed_type, repr.deletion_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_feed_link() {
        assert_eq!(
            FeedType::from_feed_link("http://example.com/shared-content.xml"),
            Some(FeedType::Shared)
        );
        assert_eq!(
            FeedType::from_feed_link("atom-selected.xml"),
            Some(FeedType::Selected)
        );
        assert_eq!(
            FeedType::from_feed_link("atom-deleted.xml"),
            Some(FeedType::Deleted)
        );
        assert_eq!(FeedType::from_feed_link("http://example.com"), None);
    }

    #[test]
    fn test_origin_precedence_prefers_shared() {
        assert_eq!(
            FeedType::from_feed_link("/shared/deleted.xml"),
            Some(FeedType::Shared)
        );
        assert_eq!(
            FeedType::from_feed_link("/deleted/selected.xml"),
            Some(FeedType::Deleted)
        );
    }

    #[test]
    fn test_feed_type_from_str() {
        assert_eq!("Shared".parse::<FeedType>(), Ok(FeedType::Shared));
        assert!("starred".parse::<FeedType>().is_err());
    }

    #[test]
    fn test_deletion_reason_from_hint() {
        assert_eq!(DeletionReason::from_hint(None), DeletionReason::Unspecified);
        assert_eq!(DeletionReason::from_hint(Some("  ")), DeletionReason::Unspecified);
        assert_eq!(
            DeletionReason::from_hint(Some("featured")),
            DeletionReason::Featured
        );
        assert_eq!(
            DeletionReason::from_hint(Some("expired")),
            DeletionReason::Other("expired".to_string())
        );
    }

    #[test]
    fn test_from_types_fills_missing_reason() {
        let set = FeedTypeSet::from_types([FeedType::Shared, FeedType::Deleted], None);
        assert!(set.is_deleted());
        assert_eq!(set.deletion_reason(), Some(&DeletionReason::Unspecified));
    }

    #[test]
    fn test_from_types_drops_orphan_reason() {
        let set = FeedTypeSet::from_types([FeedType::Shared], Some(DeletionReason::Featured));
        assert!(!set.is_deleted());
        assert_eq!(set.deletion_reason(), None);
    }

    #[test]
    fn test_serde_shape() {
        let set = FeedTypeSet::from_types(
            [FeedType::Deleted, FeedType::Shared],
            Some(DeletionReason::Selected),
        );
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"feed_type": ["shared", "deleted"], "deletion_reason": "selected"})
        );

        let back: FeedTypeSet = serde_json::from_value(value).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_display() {
        let set = FeedTypeSet::from_types(
            [FeedType::Shared, FeedType::Deleted],
            Some(DeletionReason::Featured),
        );
        assert_eq!(set.to_string(), "{shared, deleted} (featured)");
    }
}
