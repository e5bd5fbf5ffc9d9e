//! Bounded per-run refresh of the stalest records
//!
//! Each run re-fetches at most `budget` records, oldest first. Records that
//! were never refreshed come before everything else. A run stops as soon as
//! the remote budget falls below the safety floor; whatever was not reached
//! stays stale until the next run.

use super::record::{CachedRecord, Payload};
use super::table::KeyValueCache;
use crate::error::{HarvestError, HarvestResult};
use crate::quota::QuotaState;
use crate::remote::RecordSource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one refresh run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Records chosen for this run
    pub selected: usize,
    /// Records fetched and written back
    pub refreshed: usize,
    /// Records skipped after an error
    pub failed: usize,
    /// Whether the run ended on a low quota
    pub stopped_early: bool,
}

/// Refreshes up to `budget` of the stalest records per run
#[derive(Debug, Clone, Copy)]
pub struct RefreshScheduler {
    budget: usize,
}

impl RefreshScheduler {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Indices of the `budget` stalest records, oldest first
    ///
    /// Ties keep their original order.
    pub fn select<P>(&self, records: &[CachedRecord<P>]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..records.len()).collect();
        // `None` orders before any timestamp
        order.sort_by_key(|&i| records[i].last_updated);
        order.truncate(self.budget);
        order
    }

    /// Refresh the stalest records in place
    ///
    /// Per-record failures are logged and skipped. Only cancellation is
    /// returned as an error.
    pub async fn refresh<P: Payload>(
        &self,
        records: &mut [CachedRecord<P>],
        cache: &KeyValueCache<P>,
        source: &dyn RecordSource<P>,
        quota: &mut QuotaState,
        cancel: &CancellationToken,
    ) -> HarvestResult<RefreshReport> {
        let selected = self.select(records);
        let mut report = RefreshReport {
            selected: selected.len(),
            ..Default::default()
        };

        info!(
            "Refreshing {} of {} records in {} ({} never refreshed, {} calls remaining)",
            selected.len(),
            records.len(),
            cache.name(),
            records.iter().filter(|r| r.is_placeholder()).count(),
            quota.remaining
        );

        for index in selected {
            if cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }

            let key = records[index].key.clone();
            match source.fetch_record(&key).await {
                Ok(fetched) => {
                    quota.record_call(fetched.remaining_quota);
                    match cache.upsert(&key, &fetched.payload).await {
                        Ok(updated) => {
                            debug!("Refreshed {}", key);
                            records[index] = updated;
                            report.refreshed += 1;
                        }
                        Err(e) => {
                            warn!("Failed to store {}, skipping: {}", key, e);
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    quota.record_call(e.reported_quota());
                    if e.is_retryable() {
                        warn!("Transient failure fetching {}, skipping: {}", key, e);
                    } else {
                        warn!("Failed to fetch {}, skipping: {}", key, e);
                    }
                    report.failed += 1;
                }
            }

            // Failed calls count against the budget too
            if quota.below_floor() {
                warn!(
                    "Quota at {} is below the floor of {}; stopping after {} records",
                    quota.remaining, quota.safety_floor, report.refreshed
                );
                report.stopped_early = true;
                break;
            }
        }

        info!(
            "Refresh of {} done: {} refreshed, {} failed",
            cache.name(),
            report.refreshed,
            report.failed
        );
        Ok(report)
    }
}
