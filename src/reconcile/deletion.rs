use std::fmt;

use super::{normalize_uid, ReconcileError};
use crate::index::{IndexQuery, SearchIndex};
use crate::storage::ItemStore;

// ============================================================================
// Explicit Deletion
// ============================================================================

/// Result of an explicit deletion request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    /// Number of items removed from the store.
    pub removed: usize,
    /// Normalized uids that had no stored item.
    pub missing: Vec<String>,
}

impl fmt::Display for DeletionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Removed {} items.", self.removed)?;
        if !self.missing.is_empty() {
            write!(
                f,
                " {} items could not be found for deletion: {}",
                self.missing.len(),
                self.missing.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Physically remove items from the store and the index.
///
/// Ids are normalized first. An id with no stored item is reported in
/// [`DeletionSummary::missing`] but its index documents are still removed,
/// since the two may have drifted apart.
pub async fn delete_items<S, I, T>(
    store: &S,
    index: &I,
    uids: T,
) -> Result<DeletionSummary, ReconcileError>
where
    S: ItemStore + ?Sized,
    I: SearchIndex + ?Sized,
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    let mut summary = DeletionSummary::default();

    for raw in uids {
        let uid = normalize_uid(raw.as_ref());
        if store.delete(uid).await? {
            tracing::info!(uid = %uid, "Removed item");
            summary.removed += 1;
        } else {
            tracing::warn!(uid = %uid, "Item could not be found for deletion");
            summary.missing.push(uid.to_string());
        }
        index.delete_by_key(uid).await?;
    }

    Ok(summary)
}

// ============================================================================
// Restore From Deletion
// ============================================================================

/// What [`restore_from_deletion`] touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Index documents rewritten without `deleted`.
    pub documents: usize,
    /// Whether the live item was changed.
    pub item_restored: bool,
}

/// Remove `deleted` from every index document stored under `uid`.
///
/// Returns the number of documents written back. Nothing is written when the
/// uid has no documents.
pub async fn restore_index_documents<I>(index: &I, uid: &str) -> Result<usize, ReconcileError>
where
    I: SearchIndex + ?Sized,
{
    let mut documents = index.search(&IndexQuery::Uid(uid.to_string())).await?;
    if documents.is_empty() {
        tracing::debug!(uid = %uid, "No index documents to restore");
        return Ok(0);
    }

    for document in &mut documents {
        document.strip_deleted();
    }
    let count = documents.len();
    index.update(documents).await?;

    tracing::debug!(uid = %uid, documents = count, "Restored index documents");
    Ok(count)
}

/// Remove `deleted` and its reason from the stored item, if it has one.
///
/// Returns whether the item was changed.
pub async fn restore_live_item<S>(store: &S, uid: &str) -> Result<bool, ReconcileError>
where
    S: ItemStore + ?Sized,
{
    let Some(mut item) = store.get(uid).await? else {
        return Ok(false);
    };
    if !item.feed_types.clear_deletion() {
        return Ok(false);
    }

    store.put(&item).await?;
    tracing::debug!(uid = %uid, feed_types = %item.feed_types, "Item no longer marked as deleted");
    Ok(true)
}

/// Take an item out of `deleted` in both the index and the store.
///
/// The two halves are independent: either may find nothing to do.
pub async fn restore_from_deletion<S, I>(
    store: &S,
    index: &I,
    uid: &str,
) -> Result<RestoreSummary, ReconcileError>
where
    S: ItemStore + ?Sized,
    I: SearchIndex + ?Sized,
{
    let documents = restore_index_documents(index, uid).await?;
    let item_restored = restore_live_item(store, uid).await?;

    tracing::info!(
        uid = %uid,
        documents = documents,
        item_restored = item_restored,
        "Restored from deletion"
    );
    Ok(RestoreSummary {
        documents,
        item_restored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexDocument, IndexError, SqliteIndex};
    use crate::model::{DeletionReason, FeedType, FeedTypeSet, Item};
    use crate::storage::Database;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> (Database, SqliteIndex) {
        (
            Database::open(":memory:").await.unwrap(),
            SqliteIndex::open(":memory:").await.unwrap(),
        )
    }

    fn item(uid: &str, types: &[FeedType], reason: Option<DeletionReason>) -> Item {
        let mut item = Item::new(uid);
        item.feed_types = FeedTypeSet::from_types(types.iter().copied(), reason);
        item
    }

    /// Index that refuses every call.
    struct FailingIndex;

    #[async_trait]
    impl SearchIndex for FailingIndex {
        async fn search(&self, _query: &IndexQuery) -> Result<Vec<IndexDocument>, IndexError> {
            Err(IndexError::InvalidQuery("unavailable".to_string()))
        }

        async fn update(&self, _documents: Vec<IndexDocument>) -> Result<(), IndexError> {
            Err(IndexError::InvalidQuery("unavailable".to_string()))
        }

        async fn delete_by_key(&self, _uid: &str) -> Result<(), IndexError> {
            Err(IndexError::InvalidQuery("unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_delete_items_reports_missing() {
        let (store, index) = setup().await;
        store.put(&item("a", &[FeedType::Shared], None)).await.unwrap();
        store.put(&item("b", &[FeedType::Shared], None)).await.unwrap();

        let summary = delete_items(
            &store,
            &index,
            ["urn:syndication:a", "b", "urn:syndication:ghost"],
        )
        .await
        .unwrap();

        assert_eq!(summary.removed, 2);
        assert_eq!(summary.missing, vec!["ghost".to_string()]);
        assert_eq!(
            summary.to_string(),
            "Removed 2 items. 1 items could not be found for deletion: ghost"
        );
        assert_eq!(store.count_items().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_items_removes_index_documents() {
        let (store, index) = setup().await;
        let stored = item("a", &[FeedType::Shared], None);
        store.put(&stored).await.unwrap();
        index
            .update(vec![IndexDocument::from_item(&stored).unwrap()])
            .await
            .unwrap();

        let summary = delete_items(&store, &index, ["a"]).await.unwrap();
        assert_eq!(summary.to_string(), "Removed 1 items.");
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_items_index_failure_propagates() {
        let store = Database::open(":memory:").await.unwrap();
        store.put(&item("a", &[FeedType::Shared], None)).await.unwrap();

        let result = delete_items(&store, &FailingIndex, ["a"]).await;
        assert!(matches!(result, Err(ReconcileError::Index(_))));
    }

    #[tokio::test]
    async fn test_restore_leaves_unrelated_items_alone() {
        let (store, index) = setup().await;
        let target = item(
            "target",
            &[FeedType::Selected, FeedType::Deleted],
            Some(DeletionReason::Selected),
        );
        let other = item("other", &[FeedType::Shared, FeedType::Selected], None);
        store.put(&target).await.unwrap();
        store.put(&other).await.unwrap();

        let summary = restore_from_deletion(&store, &index, "target").await.unwrap();
        assert_eq!(
            summary,
            RestoreSummary {
                documents: 0,
                item_restored: true
            }
        );

        let restored = store.get("target").await.unwrap().unwrap();
        assert_eq!(
            restored.feed_types,
            FeedTypeSet::from_types([FeedType::Selected], None)
        );
        assert_eq!(restored.feed_types.deletion_reason(), None);
        assert_eq!(store.get("other").await.unwrap().unwrap(), other);
    }

    #[tokio::test]
    async fn test_restore_index_documents() {
        let (_store, index) = setup().await;
        let doc = |title: &str| {
            IndexDocument::new(
                json!({"uid": "x", "Title": title, "feed_type": ["shared", "deleted"]})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
        };
        index.update(vec![doc("one"), doc("two")]).await.unwrap();

        assert_eq!(restore_index_documents(&index, "x").await.unwrap(), 2);

        let documents = index.search(&IndexQuery::Uid("x".to_string())).await.unwrap();
        assert_eq!(documents.len(), 2);
        for document in &documents {
            assert_eq!(document.feed_types(), vec!["shared"]);
        }
    }

    #[tokio::test]
    async fn test_restore_without_matches_is_noop() {
        let (store, index) = setup().await;
        store.put(&item("live", &[FeedType::Shared], None)).await.unwrap();

        let summary = restore_from_deletion(&store, &index, "live").await.unwrap();
        assert_eq!(summary, RestoreSummary::default());

        let summary = restore_from_deletion(&store, &index, "nowhere").await.unwrap();
        assert_eq!(summary, RestoreSummary::default());
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let (store, index) = setup().await;
        store
            .put(&item(
                "a",
                &[FeedType::Shared, FeedType::Deleted],
                Some(DeletionReason::Other("expired".to_string())),
            ))
            .await
            .unwrap();

        assert!(restore_from_deletion(&store, &index, "a").await.unwrap().item_restored);
        assert!(!restore_from_deletion(&store, &index, "a").await.unwrap().item_restored);
    }

    #[tokio::test]
    async fn test_restore_index_failure_propagates() {
        let store = Database::open(":memory:").await.unwrap();
        let result = restore_from_deletion(&store, &FailingIndex, "a").await;
        assert!(matches!(result, Err(ReconcileError::Index(_))));
    }
}
