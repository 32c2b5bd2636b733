use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::BTreeSet;

use super::document::IndexDocument;
use super::{IndexError, IndexQuery, SearchIndex};
use crate::storage::connect;

// ============================================================================
// FTS5 Query Validation
// ============================================================================

const MAX_QUERY_LENGTH: usize = 256;
const MAX_WILDCARDS: usize = 3;
const MAX_OR_OPERATORS: usize = 5;
const MAX_PARENTHESES: usize = 5;
const MAX_AND_OPERATORS: usize = 10;

/// Maximum number of documents returned by a text search (OOM protection)
const MAX_RESULTS: i64 = 2000;

/// Validate FTS5 query complexity to prevent expensive wildcard expansions.
fn validate_fts_query(query: &str) -> Result<(), IndexError> {
    let invalid = |message: String| Err(IndexError::InvalidQuery(message));

    if query.len() > MAX_QUERY_LENGTH {
        return invalid(format!(
            "Search query exceeds maximum length of {} characters",
            MAX_QUERY_LENGTH
        ));
    }
    if query.matches('*').count() > MAX_WILDCARDS {
        return invalid(format!(
            "Search query contains too many wildcards (max {})",
            MAX_WILDCARDS
        ));
    }
    let upper = query.to_uppercase();
    if upper.matches(" OR ").count() > MAX_OR_OPERATORS {
        return invalid(format!(
            "Search query contains too many OR operators (max {})",
            MAX_OR_OPERATORS
        ));
    }
    if upper.matches(" AND ").count() > MAX_AND_OPERATORS {
        return invalid(format!(
            "Search query contains too many AND operators (max {})",
            MAX_AND_OPERATORS
        ));
    }
    let open = query.chars().filter(|&c| c == '(').count();
    let close = query.chars().filter(|&c| c == ')').count();
    if open > MAX_PARENTHESES {
        return invalid(format!(
            "Search query contains too many parentheses (max {})",
            MAX_PARENTHESES
        ));
    }
    if open != close {
        return invalid("Search query has unbalanced parentheses".to_string());
    }
    Ok(())
}

// ============================================================================
// Consistency Report
// ============================================================================

/// FTS5 state relative to the documents table.
#[derive(Debug)]
pub struct IndexConsistencyReport {
    pub documents_count: i64,
    pub fts_count: i64,
    /// FTS rows with no document
    pub orphaned_fts_entries: i64,
    /// Documents with no FTS row
    pub missing_fts_entries: i64,
    pub is_consistent: bool,
}

// ============================================================================
// SqliteIndex
// ============================================================================

/// Local search index: JSON documents in SQLite with an FTS5 table over
/// title and description.
///
/// Several documents may share a uid; `update` replaces all of them.
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub async fn open(path: &str) -> Result<Self, IndexError> {
        let pool = connect(path).await?;
        let index = Self { pool };
        index.migrate().await?;
        tracing::debug!(path = %path, "Opened search index");
        Ok(index)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY,
                uid TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_uid ON documents(uid)")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts
            USING fts5(title, description, content=documents, content_rowid=id)
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Sync triggers
        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS documents_fts_insert AFTER INSERT ON documents BEGIN
                INSERT INTO documents_fts(rowid, title, description)
                VALUES (new.id, new.title, new.description);
            END
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS documents_fts_delete AFTER DELETE ON documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, description)
                VALUES ('delete', old.id, old.title, old.description);
            END
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS documents_fts_update AFTER UPDATE ON documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, description)
                VALUES ('delete', old.id, old.title, old.description);
                INSERT INTO documents_fts(rowid, title, description)
                VALUES (new.id, new.title, new.description);
            END
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    fn decode(rows: Vec<(String,)>) -> Result<Vec<IndexDocument>, IndexError> {
        rows.into_iter()
            .map(|(body,)| match serde_json::from_str::<Value>(&body) {
                Ok(Value::Object(fields)) => Ok(IndexDocument::new(fields)),
                Ok(_) => Err(IndexError::Corrupt("document body is not an object".to_string())),
                Err(e) => Err(IndexError::Corrupt(e.to_string())),
            })
            .collect()
    }

    async fn search_text(&self, query: &str) -> Result<Vec<IndexDocument>, IndexError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        validate_fts_query(query)?;

        let fts_result: Result<Vec<(String,)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT d.body
            FROM documents d
            INNER JOIN documents_fts ON d.id = documents_fts.rowid
            WHERE documents_fts MATCH ?
            ORDER BY rank
            LIMIT ?
        "#,
        )
        .bind(query)
        .bind(MAX_RESULTS)
        .fetch_all(&self.pool)
        .await;

        // Fall back to LIKE for queries that fail FTS5 syntax
        let rows = match fts_result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, query = %query, "FTS5 search failed, falling back to LIKE");
                let like_pattern = format!("%{}%", query);
                sqlx::query_as(
                    r#"
                    SELECT body FROM documents
                    WHERE title LIKE ?1 OR description LIKE ?1
                    ORDER BY id
                    LIMIT ?2
                "#,
                )
                .bind(&like_pattern)
                .bind(MAX_RESULTS)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Self::decode(rows)
    }

    /// Number of documents held.
    pub async fn count(&self) -> Result<i64, IndexError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Swap the whole index for `documents` in one transaction.
    ///
    /// The batch is validated first; a rejected batch or a failed insert
    /// leaves the previous documents in place. Returns how many documents
    /// were replaced.
    pub async fn replace_all(&self, documents: Vec<IndexDocument>) -> Result<u64, IndexError> {
        validate_batch(&documents)?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        insert_documents(&mut tx, &documents).await?;
        tx.commit().await?;

        tracing::debug!(removed = removed, documents = documents.len(), "Replaced index contents");
        Ok(removed)
    }

    /// Compare the FTS5 table with the documents table.
    pub async fn check_consistency(&self) -> Result<IndexConsistencyReport, IndexError> {
        let documents_count = self.count().await?;
        let fts_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents_fts")
            .fetch_one(&self.pool)
            .await?;
        let orphaned: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM documents_fts LEFT JOIN documents ON documents_fts.rowid = documents.id WHERE documents.id IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let missing: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM documents LEFT JOIN documents_fts ON documents.id = documents_fts.rowid WHERE documents_fts.rowid IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let is_consistent = orphaned.0 == 0 && missing.0 == 0 && documents_count == fts_count.0;
        tracing::debug!(
            documents = documents_count,
            fts = fts_count.0,
            orphaned = orphaned.0,
            missing = missing.0,
            is_consistent = is_consistent,
            "Index consistency check"
        );

        Ok(IndexConsistencyReport {
            documents_count,
            fts_count: fts_count.0,
            orphaned_fts_entries: orphaned.0,
            missing_fts_entries: missing.0,
            is_consistent,
        })
    }

    /// Rebuild the FTS5 table from the documents table. Returns the document count.
    pub async fn rebuild_fts(&self) -> Result<usize, IndexError> {
        sqlx::query("INSERT INTO documents_fts(documents_fts) VALUES('rebuild')")
            .execute(&self.pool)
            .await?;
        Ok(self.count().await? as usize)
    }
}

/// Check every document of a batch before any write. Returns the distinct uids.
fn validate_batch(documents: &[IndexDocument]) -> Result<BTreeSet<String>, IndexError> {
    let mut uids = BTreeSet::new();
    for (position, document) in documents.iter().enumerate() {
        let uid = document.uid().ok_or(IndexError::MissingKey { position })?;
        if let Some(field) = document.unknown_field() {
            return Err(IndexError::UnknownField {
                uid: uid.to_string(),
                field: field.to_string(),
            });
        }
        uids.insert(uid.to_string());
    }
    Ok(uids)
}

async fn insert_documents(
    tx: &mut Transaction<'_, Sqlite>,
    documents: &[IndexDocument],
) -> Result<(), IndexError> {
    for document in documents {
        let body = serde_json::to_string(document.fields())
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        sqlx::query("INSERT INTO documents (uid, title, description, body) VALUES (?, ?, ?, ?)")
            .bind(document.uid())
            .bind(document.text_field("Title"))
            .bind(document.text_field("Description"))
            .bind(body)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl SearchIndex for SqliteIndex {
    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexDocument>, IndexError> {
        match query {
            IndexQuery::Uid(uid) => {
                let rows: Vec<(String,)> =
                    sqlx::query_as("SELECT body FROM documents WHERE uid = ? ORDER BY id")
                        .bind(uid)
                        .fetch_all(&self.pool)
                        .await?;
                Self::decode(rows)
            }
            IndexQuery::Text(text) => self.search_text(text).await,
        }
    }

    /// Validates the whole batch before writing anything, then replaces the
    /// documents of every uid it mentions in one transaction.
    async fn update(&self, documents: Vec<IndexDocument>) -> Result<(), IndexError> {
        if documents.is_empty() {
            return Ok(());
        }

        let uids = validate_batch(&documents)?;

        let mut tx = self.pool.begin().await?;
        for uid in &uids {
            sqlx::query("DELETE FROM documents WHERE uid = ?")
                .bind(uid)
                .execute(&mut *tx)
                .await?;
        }
        insert_documents(&mut tx, &documents).await?;
        tx.commit().await?;

        tracing::debug!(documents = documents.len(), uids = uids.len(), "Indexed documents");
        Ok(())
    }

    async fn delete_by_key(&self, uid: &str) -> Result<(), IndexError> {
        let result = sqlx::query("DELETE FROM documents WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        tracing::debug!(uid = %uid, removed = result.rows_affected(), "Deleted documents by key");
        Ok(())
    }
}
