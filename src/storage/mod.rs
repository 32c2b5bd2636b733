//! Persistent item collection.
//!
//! [`ItemStore`] is the seam the reconciler works against; [`Database`] is
//! the SQLite implementation.

mod items;
mod schema;
mod types;

use async_trait::async_trait;

use crate::model::Item;

pub(crate) use schema::connect;
pub use schema::Database;
pub use types::StoreError;

/// Keyed, durable item storage.
///
/// Callers are expected to hold exclusive access to a uid while mutating it;
/// implementations only need per-statement atomicity.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Get an item by uid, returning None if not found.
    async fn get(&self, uid: &str) -> Result<Option<Item>, StoreError>;

    /// Store an item under its uid (upsert semantics).
    async fn put(&self, item: &Item) -> Result<(), StoreError>;

    /// Delete an item. Returns whether it existed.
    async fn delete(&self, uid: &str) -> Result<bool, StoreError>;

    /// All items in insertion order.
    async fn list(&self) -> Result<Vec<Item>, StoreError>;

    async fn contains(&self, uid: &str) -> Result<bool, StoreError> {
        Ok(self.get(uid).await?.is_some())
    }
}
