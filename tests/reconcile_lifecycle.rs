//! Integration tests for the item lifecycle: share, select, delete, restore.
//!
//! Each test opens its own in-memory item store and search index. Feeds go
//! through the real parser so origin inference and the `push:` extension
//! elements are exercised together with the reconciler.

use pretty_assertions::assert_eq;
use pushpool::feed::parse_feed;
use pushpool::index::{IndexQuery, SearchIndex, SqliteIndex};
use pushpool::model::{DeletionReason, FeedType, FeedTypeSet};
use pushpool::reconcile::{combine_from_store, delete_items, restore_from_deletion, EntryReconciler};
use pushpool::storage::{Database, ItemStore};

async fn setup() -> (Database, SqliteIndex) {
    (
        Database::open(":memory:").await.unwrap(),
        SqliteIndex::open(":memory:").await.unwrap(),
    )
}

fn atom(feed_name: &str, entries: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:push="http://ucla.edu/#portal-pool">
  <link rel="self" href="http://pool.example.com/{feed_name}.xml" />
  <title>Example Site</title>
  <updated>2012-08-29T20:53:34Z</updated>
  <id>urn:syndication:http://example.com/site</id>
{entries}
</feed>"#
    )
    .into_bytes()
}

fn entry(id: &str, updated: &str, extra: &str) -> String {
    format!(
        r#"
  <entry>
    <title>Item {id}</title>
    <link rel="alternate" href="http://example.com/{id}" />
    <id>urn:syndication:{id}</id>
    <updated>{updated}</updated>
    <author><name>Jane</name></author>
    <summary>Summary of {id}</summary>
    <category term="news" />
    <category term="Example Site" label="Site Title" />
    {extra}
  </entry>"#
    )
}

async fn submit(store: &Database, index: &SqliteIndex, xml: &[u8]) -> String {
    let feed = parse_feed(xml).unwrap();
    EntryReconciler::new(store, index)
        .process_feed(&feed)
        .await
        .unwrap()
        .to_string()
}

async fn states(store: &Database, uid: &str) -> FeedTypeSet {
    store.get(uid).await.unwrap().unwrap().feed_types
}

fn uids(items: &[pushpool::model::Item]) -> Vec<&str> {
    items.iter().map(|i| i.uid.as_str()).collect()
}

// ============================================================================
// Update Tests
// ============================================================================

#[tokio::test]
async fn test_shared_feed_creates_and_indexes_items() {
    let (store, index) = setup().await;
    let entries = [
        entry("a", "2012-08-29T20:53:34Z", "<push:portal_type>Document</push:portal_type>"),
        entry("b", "2012-08-30T09:00:00Z", "<push:tile_urls>t1|t2</push:tile_urls>"),
    ]
    .concat();

    let summary = submit(&store, &index, &atom("shared-content", &entries)).await;
    assert_eq!(summary, "2 items created. 0 items updated.");

    let item = store.get("a").await.unwrap().unwrap();
    assert_eq!(item.title, "Item a");
    assert_eq!(item.creator, "Jane");
    assert_eq!(item.url, "http://example.com/a");
    assert_eq!(item.portal_type, "Document");
    assert_eq!(item.subject, vec!["news".to_string()]);
    assert_eq!(item.category.as_deref(), Some("Example Site"));

    let docs = index.search(&IndexQuery::Uid("b".to_string())).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].feed_types(), vec!["shared"]);
    assert_eq!(
        docs[0].get("Modified"),
        Some(&serde_json::json!("2012-08-30T09:00:00Z"))
    );
    assert_eq!(docs[0].get("deletion_reason"), None);
}

#[tokio::test]
async fn test_selected_feed_for_unknown_items_creates_nothing() {
    let (store, index) = setup().await;
    let summary = submit(
        &store,
        &index,
        &atom("atom-selected", &entry("ghost", "2012-08-29T20:53:34Z", "")),
    )
    .await;

    assert_eq!(
        summary,
        "0 items created. 0 items updated. 1 items skipped: ghost."
    );
    assert_eq!(store.count_items().await.unwrap(), 0);
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_full_lifecycle() {
    let (store, index) = setup().await;
    let share = atom("shared-content", &entry("a", "2012-08-29T20:53:34Z", ""));
    let select = atom("atom-selected", &entry("a", "2012-08-29T21:00:00Z", ""));
    let deselect = atom(
        "atom-deleted",
        &entry(
            "a",
            "2012-08-29T22:00:00Z",
            "<push:deletion_type>selected</push:deletion_type>",
        ),
    );

    submit(&store, &index, &share).await;
    submit(&store, &index, &select).await;
    assert_eq!(
        states(&store, "a").await,
        FeedTypeSet::from_types([FeedType::Shared, FeedType::Selected], None)
    );

    submit(&store, &index, &deselect).await;
    assert_eq!(
        states(&store, "a").await,
        FeedTypeSet::from_types(
            [FeedType::Shared, FeedType::Deleted],
            Some(DeletionReason::Selected)
        )
    );
    let docs = index.search(&IndexQuery::Uid("a".to_string())).await.unwrap();
    assert_eq!(docs[0].feed_types(), vec!["shared", "deleted"]);

    // Re-selecting supersedes the deletion in both places
    let summary = submit(&store, &index, &select).await;
    assert_eq!(summary, "0 items created. 1 items updated.");
    assert_eq!(
        states(&store, "a").await,
        FeedTypeSet::from_types([FeedType::Shared, FeedType::Selected], None)
    );
    let docs = index.search(&IndexQuery::Uid("a".to_string())).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].feed_types(), vec!["shared", "selected"]);
}

#[tokio::test]
async fn test_unfeature_then_reshare() {
    let (store, index) = setup().await;
    let tiles = "<push:tile_urls>t1|t2</push:tile_urls>";
    submit(
        &store,
        &index,
        &atom("shared-content", &entry("a", "2012-08-29T20:53:34Z", tiles)),
    )
    .await;

    let unfeature = entry(
        "a",
        "2012-08-29T21:00:00Z",
        "<push:deletion_type>featured</push:deletion_type><push:tile_urls></push:tile_urls>",
    );
    submit(&store, &index, &atom("atom-deleted", &unfeature)).await;

    let item = store.get("a").await.unwrap().unwrap();
    assert_eq!(
        item.feed_types,
        FeedTypeSet::from_types([FeedType::Deleted], Some(DeletionReason::Featured))
    );
    assert!(item.tiles.active().is_empty());
    assert_eq!(item.tiles.deleted().len(), 2);

    let shared = combine_from_store(&store, FeedType::Shared).await.unwrap();
    assert!(shared.is_empty());
    let deleted = combine_from_store(&store, FeedType::Deleted).await.unwrap();
    assert_eq!(uids(&deleted), vec!["a"]);

    submit(
        &store,
        &index,
        &atom("shared-content", &entry("a", "2012-08-29T22:00:00Z", "")),
    )
    .await;
    assert_eq!(
        states(&store, "a").await,
        FeedTypeSet::from_types([FeedType::Shared], None)
    );
}

#[tokio::test]
async fn test_malformed_timestamp_fails_only_that_entry() {
    let (store, index) = setup().await;
    submit(
        &store,
        &index,
        &atom("shared-content", &entry("a", "2012-08-29T20:53:34Z", "")),
    )
    .await;
    let before = store.get("a").await.unwrap().unwrap();

    let entries = [
        entry("a", "the day after tomorrow", ""),
        entry("b", "2012-08-29T20:53:34Z", ""),
    ]
    .concat();
    let summary = submit(&store, &index, &atom("atom-deleted", &entries)).await;

    assert_eq!(
        summary,
        "0 items created. 0 items updated. 1 items skipped: b. \
         1 items failed: a (malformed timestamp 'the day after tomorrow')"
    );
    assert_eq!(store.get("a").await.unwrap().unwrap(), before);
}

// ============================================================================
// View Tests
// ============================================================================

#[tokio::test]
async fn test_views_sorted_newest_first() {
    let (store, index) = setup().await;
    let entries = [
        entry("old", "2012-08-01T00:00:00Z", ""),
        entry("new", "2012-08-30T00:00:00Z", ""),
        entry("mid", "2012-08-15T00:00:00Z", ""),
    ]
    .concat();
    submit(&store, &index, &atom("shared-content", &entries)).await;
    submit(
        &store,
        &index,
        &atom("atom-selected", &entry("mid", "2012-08-15T00:00:00Z", "")),
    )
    .await;

    let shared = combine_from_store(&store, FeedType::Shared).await.unwrap();
    assert_eq!(uids(&shared), vec!["new", "mid", "old"]);

    let selected = combine_from_store(&store, FeedType::Selected).await.unwrap();
    assert_eq!(uids(&selected), vec!["mid"]);
}

// ============================================================================
// Deletion Tests
// ============================================================================

#[tokio::test]
async fn test_delete_items_summary() {
    let (store, index) = setup().await;
    let entries = [
        entry("a", "2012-08-29T20:53:34Z", ""),
        entry("b", "2012-08-29T20:53:34Z", ""),
    ]
    .concat();
    submit(&store, &index, &atom("shared-content", &entries)).await;

    let summary = delete_items(
        &store,
        &index,
        ["urn:syndication:a", "urn:syndication:b", "urn:syndication:zzz"],
    )
    .await
    .unwrap();

    assert_eq!(
        summary.to_string(),
        "Removed 2 items. 1 items could not be found for deletion: zzz"
    );
    assert_eq!(store.count_items().await.unwrap(), 0);
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_restore_from_deletion() {
    let (store, index) = setup().await;
    let entries = [
        entry("a", "2012-08-29T20:53:34Z", ""),
        entry("b", "2012-08-29T20:53:34Z", ""),
    ]
    .concat();
    submit(&store, &index, &atom("shared-content", &entries)).await;
    submit(&store, &index, &atom("atom-selected", &entries)).await;
    submit(
        &store,
        &index,
        &atom(
            "atom-deleted",
            &entry("a", "2012-08-29T21:00:00Z", "<push:deletion_type>expired</push:deletion_type>"),
        ),
    )
    .await;
    assert_eq!(
        states(&store, "a").await,
        FeedTypeSet::from_types(
            [FeedType::Shared, FeedType::Selected, FeedType::Deleted],
            Some(DeletionReason::Other("expired".to_string()))
        )
    );
    let untouched = store.get("b").await.unwrap().unwrap();

    let summary = restore_from_deletion(&store, &index, "a").await.unwrap();
    assert_eq!(summary.documents, 1);
    assert!(summary.item_restored);

    assert_eq!(
        states(&store, "a").await,
        FeedTypeSet::from_types([FeedType::Shared, FeedType::Selected], None)
    );
    let docs = index.search(&IndexQuery::Uid("a".to_string())).await.unwrap();
    assert_eq!(docs[0].feed_types(), vec!["shared", "selected"]);
    assert_eq!(store.get("b").await.unwrap().unwrap(), untouched);
}
