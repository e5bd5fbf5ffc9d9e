//! In-memory store

use super::{
    apply_bulk_insert, apply_upsert, validate_table_name, KeyValueStore, StoredEntity, Table,
    DEFAULT_MAX_BATCH,
};
use crate::error::{HarvestError, HarvestResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

/// Store that keeps tables in process memory
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    max_batch: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_max_batch(DEFAULT_MAX_BATCH)
    }

    /// Create an empty store with a custom batch limit
    pub fn with_max_batch(max_batch: usize) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            max_batch: max_batch.max(1),
        }
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> HarvestResult<R>,
    ) -> HarvestResult<R> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| HarvestError::Internal("memory store lock poisoned".to_string()))?;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| HarvestError::TableNotFound(table.to_string()))?;
        f(rows)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn create_if_missing(&self, table: &str) -> HarvestResult<()> {
        validate_table_name(table)?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| HarvestError::Internal("memory store lock poisoned".to_string()))?;
        tables.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn list_all(&self, table: &str) -> HarvestResult<Vec<StoredEntity>> {
        self.with_table(table, |rows| Ok(rows.values().cloned().collect()))
    }

    async fn upsert(
        &self,
        table: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> HarvestResult<StoredEntity> {
        self.with_table(table, |rows| Ok(apply_upsert(rows, key, payload, Utc::now())))
    }

    async fn bulk_insert(&self, table: &str, entities: Vec<StoredEntity>) -> HarvestResult<()> {
        let max_batch = self.max_batch;
        self.with_table(table, |rows| {
            apply_bulk_insert(table, rows, entities, max_batch)
        })
    }
}
