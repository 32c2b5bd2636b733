use std::cmp::Reverse;

use crate::model::{FeedType, Item};
use crate::storage::{ItemStore, StoreError};

/// Items belonging to `target`, newest first.
///
/// The `deleted` view holds every deleted item. The other views leave out
/// items removed by a `featured` deletion, since those no longer appear on
/// any live feed even if an older membership flag survived. Items with equal
/// `modified` keep their input order.
pub fn combine<I>(items: I, target: FeedType) -> Vec<Item>
where
    I: IntoIterator<Item = Item>,
{
    let mut view: Vec<Item> = items
        .into_iter()
        .filter(|item| {
            let states = &item.feed_types;
            match target {
                FeedType::Deleted => states.is_deleted(),
                _ => states.contains(target) && !states.is_featured_deletion(),
            }
        })
        .collect();

    view.sort_by_key(|item| Reverse(item.modified));
    view
}

/// [`combine`] over everything in `store`.
pub async fn combine_from_store<S>(store: &S, target: FeedType) -> Result<Vec<Item>, StoreError>
where
    S: ItemStore + ?Sized,
{
    let items = store.list().await?;
    let total = items.len();
    let view = combine(items, target);
    tracing::debug!(feed = %target, total = total, matched = view.len(), "Combined view");
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeletionReason, FeedTypeSet};
    use crate::storage::Database;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 8, 29, 20, 0, 0).unwrap()
    }

    fn item(uid: &str, types: &[FeedType], reason: Option<DeletionReason>, minutes: i64) -> Item {
        let mut item = Item::new(uid);
        item.feed_types = FeedTypeSet::from_types(types.iter().copied(), reason);
        item.modified = base_time() + Duration::minutes(minutes);
        item
    }

    fn uids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.uid.as_str()).collect()
    }

    fn fixture() -> Vec<Item> {
        vec![
            item("shared-only", &[FeedType::Shared], None, 0),
            item(
                "shared-deleted-selected",
                &[FeedType::Shared, FeedType::Deleted],
                Some(DeletionReason::Selected),
                1,
            ),
            item(
                "featured-gone",
                &[FeedType::Deleted],
                Some(DeletionReason::Featured),
                2,
            ),
            item(
                "shared-selected",
                &[FeedType::Shared, FeedType::Selected],
                None,
                3,
            ),
            // Legacy row still flagged shared after a featured removal
            item(
                "stale-featured",
                &[FeedType::Shared, FeedType::Deleted],
                Some(DeletionReason::Featured),
                4,
            ),
        ]
    }

    #[test]
    fn test_shared_view() {
        let view = combine(fixture(), FeedType::Shared);
        assert_eq!(
            uids(&view),
            vec!["shared-selected", "shared-deleted-selected", "shared-only"]
        );
    }

    #[test]
    fn test_selected_view() {
        let view = combine(fixture(), FeedType::Selected);
        assert_eq!(uids(&view), vec!["shared-selected"]);
    }

    #[test]
    fn test_deleted_view_includes_featured() {
        let view = combine(fixture(), FeedType::Deleted);
        assert_eq!(
            uids(&view),
            vec!["stale-featured", "featured-gone", "shared-deleted-selected"]
        );
    }

    #[test]
    fn test_sorted_by_modified_descending() {
        let items = vec![
            item("middle", &[FeedType::Shared], None, 10),
            item("oldest", &[FeedType::Shared], None, -30),
            item("newest", &[FeedType::Shared], None, 45),
            item("older", &[FeedType::Shared], None, 0),
        ];
        let view = combine(items, FeedType::Shared);
        assert_eq!(uids(&view), vec!["newest", "middle", "older", "oldest"]);
        assert!(view
            .windows(2)
            .all(|pair| pair[0].modified >= pair[1].modified));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let items = vec![
            item("first", &[FeedType::Shared], None, 5),
            item("second", &[FeedType::Shared], None, 5),
            item("third", &[FeedType::Shared], None, 5),
        ];
        let view = combine(items, FeedType::Shared);
        assert_eq!(uids(&view), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(combine(Vec::new(), FeedType::Deleted).is_empty());
    }

    #[tokio::test]
    async fn test_combine_from_store() {
        let db = Database::open(":memory:").await.unwrap();
        for item in fixture() {
            db.put(&item).await.unwrap();
        }

        let view = combine_from_store(&db, FeedType::Shared).await.unwrap();
        assert_eq!(
            uids(&view),
            vec!["shared-selected", "shared-deleted-selected", "shared-only"]
        );
    }
}
