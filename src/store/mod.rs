//! Persistent key-value tables
//!
//! A store holds named tables of `StoredEntity` rows keyed by string. Payloads
//! are untyped JSON here; `cache::KeyValueCache` gives them a schema.
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | `create_if_missing` | Create an empty table, no-op if present |
//! | `list_all` | Full snapshot of a table |
//! | `upsert` | Overwrite one row, stamp `last_updated` |
//! | `bulk_insert` | Insert new rows atomically, reject existing keys |

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::{HarvestError, HarvestResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum rows per `bulk_insert` for the bundled stores
pub const DEFAULT_MAX_BATCH: usize = 100;

/// A row as persisted by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Row key, unique within a table
    pub key: String,

    /// Untyped payload
    #[serde(default)]
    pub payload: serde_json::Value,

    /// When the payload was last written by a refresh
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl StoredEntity {
    /// A never-refreshed placeholder
    pub fn placeholder(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            payload,
            last_updated: None,
        }
    }
}

/// Backing store for cache tables
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Largest number of rows accepted by one `bulk_insert`
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }

    /// Create `table` if it does not exist
    async fn create_if_missing(&self, table: &str) -> HarvestResult<()>;

    /// All rows of `table`
    async fn list_all(&self, table: &str) -> HarvestResult<Vec<StoredEntity>>;

    /// Write one row, setting `last_updated` to now
    async fn upsert(
        &self,
        table: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> HarvestResult<StoredEntity>;

    /// Insert rows as one batch; fails without writing if any key exists
    async fn bulk_insert(&self, table: &str, entities: Vec<StoredEntity>) -> HarvestResult<()>;
}

/// In-memory image of one table, shared by the bundled stores
pub(crate) type Table = BTreeMap<String, StoredEntity>;

/// Overwrite a row, never moving its timestamp backwards
pub(crate) fn apply_upsert(
    table: &mut Table,
    key: &str,
    payload: serde_json::Value,
    now: DateTime<Utc>,
) -> StoredEntity {
    let previous = table.get(key).and_then(|e| e.last_updated);
    let stamped = match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    };

    let entity = StoredEntity {
        key: key.to_string(),
        payload,
        last_updated: Some(stamped),
    };
    table.insert(key.to_string(), entity.clone());
    entity
}

/// Insert a batch, all or nothing
pub(crate) fn apply_bulk_insert(
    table_name: &str,
    table: &mut Table,
    entities: Vec<StoredEntity>,
    max_batch: usize,
) -> HarvestResult<()> {
    if entities.len() > max_batch {
        return Err(HarvestError::store(format!(
            "batch of {} exceeds limit of {}",
            entities.len(),
            max_batch
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for entity in &entities {
        if table.contains_key(&entity.key) || !seen.insert(entity.key.as_str()) {
            return Err(HarvestError::DuplicateKey {
                table: table_name.to_string(),
                key: entity.key.clone(),
            });
        }
    }

    for entity in entities {
        table.insert(entity.key.clone(), entity);
    }
    Ok(())
}

/// Reject table names that are unsafe as file names
pub(crate) fn validate_table_name(name: &str) -> HarvestResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(HarvestError::User(format!("Invalid table name: {:?}", name)))
    }
}
