use chrono::{DateTime, Utc};
use std::fmt;

use super::deletion::restore_from_deletion;
use super::{normalize_uid, parse_timestamp, EntryError, ReconcileError};
use crate::feed::{FeedEntry, ParsedFeed};
use crate::index::{IndexDocument, SearchIndex};
use crate::model::{
    apply_transition, parse_tile_refs, DeletionReason, FeedType, Item, Outcome,
    SITE_TITLE_LABEL,
};
use crate::storage::ItemStore;

// ============================================================================
// Summary
// ============================================================================

/// What happened to a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Created,
    Updated,
    /// Unseen uid whose notification would leave it in no feed.
    Skipped,
    Failed(EntryError),
}

/// Tally of one feed submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, EntryError)>,
}

impl UpdateSummary {
    fn record(&mut self, uid: &str, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Created => self.created += 1,
            EntryOutcome::Updated => self.updated += 1,
            EntryOutcome::Skipped => self.skipped.push(uid.to_string()),
            EntryOutcome::Failed(err) => self.failed.push((uid.to_string(), err.clone())),
        }
    }
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items created. {} items updated.",
            self.created, self.updated
        )?;
        if !self.skipped.is_empty() {
            write!(
                f,
                " {} items skipped: {}.",
                self.skipped.len(),
                self.skipped.join(", ")
            )?;
        }
        if !self.failed.is_empty() {
            let failed: Vec<String> = self
                .failed
                .iter()
                .map(|(uid, err)| format!("{} ({})", uid, err))
                .collect();
            write!(f, " {} items failed: {}", self.failed.len(), failed.join(", "))?;
        }
        Ok(())
    }
}

// ============================================================================
// EntryReconciler
// ============================================================================

/// Applies feed entries to the item store and queues the touched items for
/// the search index.
///
/// One reconciler handles one submission; entries are processed in order and
/// the index is updated once at the end.
pub struct EntryReconciler<'a, S: ?Sized, I: ?Sized> {
    store: &'a S,
    index: &'a I,
    summary: UpdateSummary,
    pending: Vec<Item>,
}

impl<'a, S, I> EntryReconciler<'a, S, I>
where
    S: ItemStore + ?Sized,
    I: SearchIndex + ?Sized,
{
    pub fn new(store: &'a S, index: &'a I) -> Self {
        Self {
            store,
            index,
            summary: UpdateSummary::default(),
            pending: Vec::new(),
        }
    }

    /// Summary of everything processed so far.
    pub fn summary(&self) -> &UpdateSummary {
        &self.summary
    }

    /// Process every entry of a submission, then update the index.
    pub async fn process_feed(&mut self, feed: &ParsedFeed) -> Result<UpdateSummary, ReconcileError> {
        if feed.origin.is_none() {
            tracing::warn!(
                feed_link = feed.feed_link.as_deref().unwrap_or(""),
                "Could not infer origin feed, states will not change"
            );
        }

        for entry in &feed.entries {
            self.process_entry(feed.origin, entry).await?;
        }
        self.update_index().await?;

        let summary = std::mem::take(&mut self.summary);
        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Processed feed"
        );
        Ok(summary)
    }

    /// Apply one entry arriving on `origin`.
    ///
    /// A malformed timestamp fails only this entry and leaves the store
    /// untouched. Store and index errors are returned.
    pub async fn process_entry(
        &mut self,
        origin: Option<FeedType>,
        entry: &FeedEntry,
    ) -> Result<EntryOutcome, ReconcileError> {
        let uid = normalize_uid(&entry.id).to_string();
        let outcome = self.reconcile_entry(&uid, origin, entry).await?;
        self.summary.record(&uid, &outcome);
        Ok(outcome)
    }

    async fn reconcile_entry(
        &mut self,
        uid: &str,
        origin: Option<FeedType>,
        entry: &FeedEntry,
    ) -> Result<EntryOutcome, ReconcileError> {
        let modified = match entry.updated.as_deref().map(parse_timestamp).transpose() {
            Ok(modified) => modified,
            Err(err) => {
                tracing::warn!(uid = %uid, error = %err, "Skipping entry");
                return Ok(EntryOutcome::Failed(err));
            }
        };

        match self.store.get(uid).await? {
            None => {
                let mut item = Item::new(uid);
                apply_entry(&mut item, entry, origin, modified);
                if item.feed_types.is_empty() {
                    tracing::info!(
                        uid = %uid,
                        origin = origin.map(FeedType::as_str).unwrap_or("unknown"),
                        "Skipping notification for unknown item"
                    );
                    return Ok(EntryOutcome::Skipped);
                }
                tracing::info!(uid = %uid, feed_types = %item.feed_types, "Creating item");
                self.store.put(&item).await?;
                self.queue(item);
                Ok(EntryOutcome::Created)
            }
            Some(mut item) => {
                // Selecting an unshared item is refused, so it is not restored either
                let restoring = item.feed_types.is_deleted()
                    && match origin {
                        Some(FeedType::Shared) => true,
                        Some(FeedType::Selected) => item.feed_types.is_shared(),
                        _ => false,
                    };
                if restoring {
                    restore_from_deletion(self.store, self.index, uid).await?;
                    if let Some(reloaded) = self.store.get(uid).await? {
                        item = reloaded;
                    }
                }

                apply_entry(&mut item, entry, origin, modified);
                tracing::info!(uid = %uid, feed_types = %item.feed_types, "Updating item");
                self.store.put(&item).await?;
                self.queue(item);
                Ok(EntryOutcome::Updated)
            }
        }
    }

    /// Keep only the latest version of each item.
    fn queue(&mut self, item: Item) {
        match self.pending.iter_mut().find(|queued| queued.uid == item.uid) {
            Some(queued) => *queued = item,
            None => self.pending.push(item),
        }
    }

    /// Send every queued item to the index in a single batch.
    ///
    /// Returns the number of documents sent.
    pub async fn update_index(&mut self) -> Result<usize, ReconcileError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let documents = self
            .pending
            .iter()
            .map(IndexDocument::from_item)
            .collect::<Result<Vec<_>, _>>()?;
        let count = documents.len();
        self.index.update(documents).await?;
        self.pending.clear();

        tracing::debug!(documents = count, "Updated index");
        Ok(count)
    }
}

/// Copy the entry's fields onto `item` and run the state transition.
///
/// `modified` is the already-parsed `updated` timestamp, so nothing here can
/// fail halfway.
fn apply_entry(
    item: &mut Item,
    entry: &FeedEntry,
    origin: Option<FeedType>,
    modified: Option<DateTime<Utc>>,
) {
    if let Some(title) = &entry.title {
        item.title = title.clone();
    }
    if let Some(portal_type) = &entry.portal_type {
        item.portal_type = portal_type.clone();
    }
    if let Some(author) = &entry.author {
        item.creator = author.clone();
    }
    if let Some(modified) = modified {
        item.modified = modified;
    }
    if let Some(link) = &entry.link {
        item.url = link.clone();
    }
    if let Some(summary) = &entry.summary {
        item.description = summary.clone();
    }
    if !entry.content.is_empty() {
        item.content = entry.content.clone();
    }
    if let Some(tags) = &entry.tags {
        let is_site_title = |label: &Option<String>| label.as_deref() == Some(SITE_TITLE_LABEL);
        item.subject = tags
            .iter()
            .filter(|tag| !is_site_title(&tag.label))
            .map(|tag| tag.term.clone())
            .collect();
        if let Some(site) = tags.iter().find(|tag| is_site_title(&tag.label)) {
            item.category = Some(site.term.clone());
        }
    }

    let mut removed_now = false;
    if let Some(origin) = origin {
        let reason = DeletionReason::from_hint(entry.deletion_type.as_deref());
        let result = apply_transition(&item.feed_types, origin, Some(&reason));
        match result.outcome {
            Outcome::Rejected(reject) => {
                tracing::debug!(uid = %item.uid, origin = %origin, "{}", reject.describe());
            }
            Outcome::Changed => {
                tracing::debug!(uid = %item.uid, from = %item.feed_types, to = %result.state, "Feed types changed");
            }
            Outcome::Unchanged => {}
        }
        removed_now = result.outcome == Outcome::Changed && result.state.is_fully_removed();
        item.feed_types = result.state;
    }

    apply_tiles(item, entry, removed_now);
}

/// `removed_now` is set when this entry's transition left only `deleted`.
/// The live tiles are then retired whatever tile fields the entry carries.
/// An item that was already fully removed keeps its retired set untouched
/// so a later re-share can bring those tiles back.
fn apply_tiles(item: &mut Item, entry: &FeedEntry, removed_now: bool) {
    if removed_now {
        item.tiles.retire_all();
        return;
    }
    if item.feed_types.is_fully_removed() {
        return;
    }
    if let Some(raw) = &entry.tile_urls {
        item.tiles.add_active(parse_tile_refs(raw));
    }
    if let Some(raw) = &entry.deleted_tile_urls {
        item.tiles.add_deleted(parse_tile_refs(raw));
    }
}
