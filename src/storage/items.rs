use async_trait::async_trait;
use chrono::SecondsFormat;

use super::schema::Database;
use super::types::{ItemRow, StoreError};
use super::ItemStore;
use crate::model::{FeedType, Item};

const ITEM_COLUMNS: &str = "uid, title, portal_type, creator, modified, url, description, \
     subject, category, feed_type, deletion_reason, tile_urls, deleted_tile_urls, content";

fn to_json<T: serde::Serialize>(uid: &str, column: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        uid: uid.to_string(),
        message: format!("{column}: {e}"),
    })
}

#[async_trait]
impl ItemStore for Database {
    async fn get(&self, uid: &str) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE uid = ?"
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ItemRow::into_item).transpose()
    }

    /// Upsert by uid. The row keeps its original position in [`list`](ItemStore::list).
    async fn put(&self, item: &Item) -> Result<(), StoreError> {
        let uid = item.uid.as_str();
        let feed_types: Vec<FeedType> = item.feed_types.iter().collect();

        sqlx::query(
            r#"
            INSERT INTO items (uid, title, portal_type, creator, modified, url, description,
                               subject, category, feed_type, deletion_reason, tile_urls,
                               deleted_tile_urls, content)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                title = excluded.title,
                portal_type = excluded.portal_type,
                creator = excluded.creator,
                modified = excluded.modified,
                url = excluded.url,
                description = excluded.description,
                subject = excluded.subject,
                category = excluded.category,
                feed_type = excluded.feed_type,
                deletion_reason = excluded.deletion_reason,
                tile_urls = excluded.tile_urls,
                deleted_tile_urls = excluded.deleted_tile_urls,
                content = excluded.content
        "#,
        )
        .bind(uid)
        .bind(&item.title)
        .bind(&item.portal_type)
        .bind(&item.creator)
        .bind(item.modified.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .bind(&item.url)
        .bind(&item.description)
        .bind(to_json(uid, "subject", &item.subject)?)
        .bind(&item.category)
        .bind(to_json(uid, "feed_type", &feed_types)?)
        .bind(item.feed_types.deletion_reason().map(|r| r.as_str().to_string()))
        .bind(to_json(uid, "tile_urls", item.tiles.active())?)
        .bind(to_json(uid, "deleted_tile_urls", item.tiles.deleted())?)
        .bind(to_json(uid, "content", &item.content)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, uid: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM items WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }
}

impl Database {
    /// Number of stored items.
    pub async fn count_items(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
