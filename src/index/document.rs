use chrono::SecondsFormat;
use serde_json::{Map, Value};

use super::IndexError;
use crate::model::{FeedType, Item};

/// Fields the index schema knows about. Anything else rejects the batch.
pub const SCHEMA_FIELDS: [&str; 13] = [
    "uid",
    "Title",
    "portal_type",
    "Creator",
    "Modified",
    "url",
    "Description",
    "Subject",
    "Category",
    "feed_type",
    "tile_urls",
    "deleted_tile_urls",
    "content",
];

/// Item fields that only make sense inside the pool and never reach the index.
pub const INTERNAL_FIELDS: [&str; 1] = ["deletion_reason"];

/// A free-form search document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDocument(Map<String, Value>);

impl IndexDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Convert an item into a document the index schema accepts.
    ///
    /// Internal-only fields are dropped and `Modified` is rendered as
    /// `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn from_item(item: &Item) -> Result<Self, IndexError> {
        let value = serde_json::to_value(item).map_err(|e| IndexError::Corrupt(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(IndexError::Corrupt(format!(
                "item '{}' did not serialize to an object",
                item.uid
            )));
        };

        for field in INTERNAL_FIELDS {
            fields.remove(field);
        }
        fields.insert(
            "Modified".to_string(),
            Value::String(item.modified.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        Ok(Self(fields))
    }

    pub fn uid(&self) -> Option<&str> {
        self.0.get("uid").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// String members of the `feed_type` field.
    pub fn feed_types(&self) -> Vec<&str> {
        self.0
            .get("feed_type")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// First field that is not part of the index schema, if any.
    pub fn unknown_field(&self) -> Option<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .find(|key| !SCHEMA_FIELDS.contains(key))
    }

    /// Remove `deleted` from `feed_type` and drop any deletion reason.
    ///
    /// Returns whether the document changed.
    pub fn strip_deleted(&mut self) -> bool {
        let deleted = FeedType::Deleted.as_str();
        let mut changed = false;
        if let Some(Value::Array(values)) = self.0.get_mut("feed_type") {
            let before = values.len();
            values.retain(|v| v.as_str() != Some(deleted));
            changed = values.len() != before;
        }
        for field in INTERNAL_FIELDS {
            changed |= self.0.remove(field).is_some();
        }
        changed
    }

    /// Text used for the full-text columns.
    pub(crate) fn text_field(&self, field: &str) -> String {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}
