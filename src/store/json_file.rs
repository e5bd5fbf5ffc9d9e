//! JSON file store
//!
//! Each table is one `<name>.json` file under the store directory. Writes go
//! to a temporary file first and are renamed into place, so a crash never
//! leaves a half-written table behind.

use super::{
    apply_bulk_insert, apply_upsert, validate_table_name, KeyValueStore, StoredEntity, Table,
    DEFAULT_MAX_BATCH,
};
use crate::error::{HarvestError, HarvestResult};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Store backed by one JSON file per table
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> HarvestResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| HarvestError::io(format!("creating store dir {}", dir.display()), e))?;

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.json", table))
    }

    async fn read_table(&self, table: &str) -> HarvestResult<Table> {
        validate_table_name(table)?;
        let path = self.table_path(table);

        if !path.exists() {
            return Err(HarvestError::TableNotFound(table.to_string()));
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| HarvestError::io(format!("reading table {}", path.display()), e))?;

        let rows: Vec<StoredEntity> = serde_json::from_str(&content)?;
        Ok(rows.into_iter().map(|e| (e.key.clone(), e)).collect())
    }

    async fn write_table(&self, table: &str, rows: &Table) -> HarvestResult<()> {
        let path = self.table_path(table);
        let tmp = path.with_extension("json.tmp");

        let rows: Vec<&StoredEntity> = rows.values().collect();
        let content = serde_json::to_string_pretty(&rows)?;

        fs::write(&tmp, content)
            .await
            .map_err(|e| HarvestError::io(format!("writing table {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| HarvestError::io(format!("replacing table {}", path.display()), e))?;

        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }

    async fn create_if_missing(&self, table: &str) -> HarvestResult<()> {
        validate_table_name(table)?;
        let _guard = self.write_lock.lock().await;

        if self.table_path(table).exists() {
            return Ok(());
        }

        debug!("Creating table {}", table);
        self.write_table(table, &Table::new()).await
    }

    async fn list_all(&self, table: &str) -> HarvestResult<Vec<StoredEntity>> {
        let rows = self.read_table(table).await?;
        Ok(rows.into_values().collect())
    }

    async fn upsert(
        &self,
        table: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> HarvestResult<StoredEntity> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.read_table(table).await?;
        let entity = apply_upsert(&mut rows, key, payload, Utc::now());
        self.write_table(table, &rows).await?;
        Ok(entity)
    }

    async fn bulk_insert(&self, table: &str, entities: Vec<StoredEntity>) -> HarvestResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.read_table(table).await?;
        apply_bulk_insert(table, &mut rows, entities, DEFAULT_MAX_BATCH)?;
        self.write_table(table, &rows).await
    }
}
