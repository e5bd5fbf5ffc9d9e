//! One synchronization run
//!
//! 1. Walk the remote member list to discover keys.
//! 2. Seed placeholders for keys the cache has never seen.
//! 3. Reload the working set and refresh the stalest records.
//!
//! Seeding failures abort the run: refreshing a partially seeded cache would
//! present it as complete.

use crate::cache::{
    BulkInsertSummary, CachedRecord, KeyValueCache, Payload, RefreshReport, RefreshScheduler,
};
use crate::error::HarvestResult;
use crate::pagination::{PageIterator, PageSource};
use crate::quota::QuotaGate;
use crate::remote::RecordSource;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outcome of a sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Keys found on the remote
    pub discovered: usize,
    /// Placeholder seeding
    pub seeded: BulkInsertSummary,
    /// Refresh pass
    pub refresh: RefreshReport,
}

/// Collect every key from a paginated remote listing
pub async fn discover_keys(
    source: &dyn PageSource<String>,
    gate: &mut QuotaGate,
    margin: u32,
    cancel: &CancellationToken,
) -> HarvestResult<Vec<String>> {
    let keys = PageIterator::new(source, gate, cancel)
        .with_margin(margin)
        .collect_all()
        .await?;

    info!("Discovered {} keys", keys.len());
    Ok(keys)
}

/// Seed placeholders for `keys` and load the resulting working set
pub async fn seed<P: Payload>(
    cache: &KeyValueCache<P>,
    keys: &[String],
) -> HarvestResult<(BulkInsertSummary, Vec<CachedRecord<P>>)> {
    cache.ensure_table().await?;
    let summary = cache.bulk_insert_if_absent(keys).await?;
    let records = cache.list_all().await?;
    Ok((summary, records))
}

/// Discovery, seeding and refresh for one cache
pub struct SyncJob<'a, P> {
    pub cache: &'a KeyValueCache<P>,
    pub source: &'a dyn RecordSource<P>,
    pub scheduler: RefreshScheduler,
    pub pagination_margin: u32,
}

impl<'a, P: Payload> SyncJob<'a, P> {
    /// Run the job
    ///
    /// `member_gate` guards the listing's quota. `record_gate` is probed
    /// once before refreshing, then its state tracks per-record fetches.
    pub async fn run(
        &self,
        members: &dyn PageSource<String>,
        member_gate: &mut QuotaGate,
        record_gate: &mut QuotaGate,
        cancel: &CancellationToken,
    ) -> HarvestResult<SyncReport> {
        let keys = discover_keys(members, member_gate, self.pagination_margin, cancel).await?;
        let (seeded, mut records) = seed(self.cache, &keys).await?;

        // Replace the assumed budget with a probed one before the first fetch
        if !records.is_empty() && self.scheduler.budget() > 0 {
            let floor = record_gate.state().safety_floor;
            record_gate
                .ensure_capacity(floor.saturating_add(1), cancel)
                .await?;
        }

        let refresh = self
            .scheduler
            .refresh(
                &mut records,
                self.cache,
                self.source,
                record_gate.state_mut(),
                cancel,
            )
            .await?;

        Ok(SyncReport {
            discovered: keys.len(),
            seeded,
            refresh,
        })
    }
}
