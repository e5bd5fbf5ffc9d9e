//! Typed view over one store table

use super::record::{CachedRecord, Payload};
use crate::error::{HarvestError, HarvestResult};
use crate::store::{KeyValueStore, StoredEntity};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of `bulk_insert_if_absent`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkInsertSummary {
    /// Distinct keys requested
    pub requested: usize,
    /// Placeholders written
    pub inserted: usize,
    /// Keys already present
    pub existing: usize,
    /// Store batches issued
    pub batches: usize,
}

/// Key-value cache of `CachedRecord<P>` rows in a named table
pub struct KeyValueCache<P> {
    store: Arc<dyn KeyValueStore>,
    table: String,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> KeyValueCache<P> {
    pub fn new(store: Arc<dyn KeyValueStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            _payload: PhantomData,
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.table
    }

    /// Create the backing table if needed
    pub async fn ensure_table(&self) -> HarvestResult<()> {
        self.store.create_if_missing(&self.table).await
    }

    /// Full snapshot of the cache
    pub async fn list_all(&self) -> HarvestResult<Vec<CachedRecord<P>>> {
        let rows = self.store.list_all(&self.table).await?;
        let records = rows
            .into_iter()
            .map(CachedRecord::from_stored)
            .collect::<HarvestResult<Vec<_>>>()?;

        debug!("Loaded {} records from {}", records.len(), self.table);
        Ok(records)
    }

    /// Overwrite one record and stamp it as refreshed now
    pub async fn upsert(&self, key: &str, payload: &P) -> HarvestResult<CachedRecord<P>> {
        let value = serde_json::to_value(payload)?;
        let stored = self.store.upsert(&self.table, key, value).await?;

        Ok(CachedRecord {
            key: stored.key,
            payload: payload.clone(),
            last_updated: stored.last_updated,
        })
    }

    /// Write placeholders for every key not already cached
    ///
    /// Keys are de-duplicated and written in batches no larger than the
    /// store's limit. A failed batch does not stop the others, but any
    /// failure is reported once all batches have been attempted.
    pub async fn bulk_insert_if_absent(&self, keys: &[String]) -> HarvestResult<BulkInsertSummary> {
        let existing: HashSet<String> = self
            .store
            .list_all(&self.table)
            .await?
            .into_iter()
            .map(|e| e.key)
            .collect();

        let mut seen = HashSet::new();
        let distinct: Vec<&String> = keys.iter().filter(|k| seen.insert(k.as_str())).collect();
        let missing: Vec<&String> = distinct
            .iter()
            .copied()
            .filter(|k| !existing.contains(k.as_str()))
            .collect();

        let mut summary = BulkInsertSummary {
            requested: distinct.len(),
            existing: distinct.len() - missing.len(),
            ..Default::default()
        };

        if missing.is_empty() {
            debug!("All {} keys already present in {}", summary.requested, self.table);
            return Ok(summary);
        }

        let placeholder = serde_json::to_value(P::default())?;
        let batch_size = self.store.max_batch_size().max(1);
        let mut failures: Vec<HarvestError> = Vec::new();

        for chunk in missing.chunks(batch_size) {
            summary.batches += 1;
            let batch = chunk
                .iter()
                .map(|k| StoredEntity::placeholder(k.as_str(), placeholder.clone()))
                .collect();

            match self.store.bulk_insert(&self.table, batch).await {
                Ok(()) => summary.inserted += chunk.len(),
                Err(e) => {
                    warn!(
                        "Batch {} of placeholders for {} failed: {}",
                        summary.batches, self.table, e
                    );
                    failures.push(e);
                }
            }
        }

        if let Some(first) = failures.first() {
            return Err(HarvestError::BulkWrite {
                table: self.table.clone(),
                failed: failures.len(),
                total: summary.batches,
                first_cause: first.to_string(),
            });
        }

        info!(
            "Seeded {} new keys into {} ({} already present)",
            summary.inserted, self.table, summary.existing
        );
        Ok(summary)
    }
}
