//! Per-key read path
//!
//! | Cache | Key present | Stale | Quota ok | Action |
//! |-------|-------------|-------|----------|--------|
//! | no | - | - | yes | call remote, return live result |
//! | no | - | - | no | return nothing, remote untouched |
//! | yes | no | - | - | return nothing, warn |
//! | yes | yes | no | - | serve cached payload |
//! | yes | yes | yes | - | serve cached payload |
//!
//! Point lookups never refresh a stale entry; only `RefreshScheduler` does.

use super::record::{CachedRecord, Payload};
use super::staleness::StalenessPolicy;
use crate::quota::QuotaState;
use crate::remote::RecordSource;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// What a lookup does for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupAction {
    /// No cache: fetch from the remote
    CallRemote,
    /// No cache and no quota: return nothing
    SkipQuotaExhausted,
    /// Cache configured but the key is unknown
    NotInCache,
    /// Cached and fresh
    ServeFresh,
    /// Cached but stale; served as-is
    ServeStale,
}

/// Read path over either the cached working set or the live remote
pub enum CacheBackedLookup<'a, P> {
    /// Serve from the working set loaded at the start of the run
    Cached {
        index: HashMap<&'a str, &'a CachedRecord<P>>,
        policy: StalenessPolicy,
    },
    /// No cache configured: call the remote while quota allows
    Live {
        source: &'a dyn RecordSource<P>,
        quota: &'a mut QuotaState,
    },
}

impl<'a, P: Payload> CacheBackedLookup<'a, P> {
    /// Lookups served from `records`
    pub fn cached(records: &'a [CachedRecord<P>], policy: StalenessPolicy) -> Self {
        let index = records.iter().map(|r| (r.key.as_str(), r)).collect();
        Self::Cached { index, policy }
    }

    /// Lookups served by the remote
    pub fn live(source: &'a dyn RecordSource<P>, quota: &'a mut QuotaState) -> Self {
        Self::Live { source, quota }
    }

    /// Decide how `key` would be served at `now`
    pub fn decide(&self, key: &str, now: DateTime<Utc>) -> LookupAction {
        match self {
            Self::Live { quota, .. } => {
                if quota.can_spend(1) {
                    LookupAction::CallRemote
                } else {
                    LookupAction::SkipQuotaExhausted
                }
            }
            Self::Cached { index, policy } => match index.get(key) {
                None => LookupAction::NotInCache,
                Some(record) if policy.is_stale(record, now) => LookupAction::ServeStale,
                Some(_) => LookupAction::ServeFresh,
            },
        }
    }

    /// Payload for `key`, or `None` when it cannot be served
    pub async fn get(&mut self, key: &str) -> Option<P> {
        let action = self.decide(key, Utc::now());

        match (action, self) {
            (LookupAction::CallRemote, Self::Live { source, quota }) => {
                match source.fetch_record(key).await {
                    Ok(fetched) => {
                        quota.record_call(fetched.remaining_quota);
                        Some(fetched.payload)
                    }
                    Err(e) => {
                        quota.record_call(e.reported_quota());
                        warn!("Live lookup of {} failed: {}", key, e);
                        None
                    }
                }
            }
            (LookupAction::SkipQuotaExhausted, Self::Live { quota, .. }) => {
                debug!(
                    "Skipping live lookup of {}: {} calls remaining",
                    key, quota.remaining
                );
                None
            }
            (LookupAction::NotInCache, _) => {
                warn!("{} not found in cache", key);
                None
            }
            (LookupAction::ServeStale, Self::Cached { index, .. }) => {
                debug!("Serving stale cache entry for {}", key);
                index.get(key).map(|r| r.payload.clone())
            }
            (LookupAction::ServeFresh, Self::Cached { index, .. }) => {
                index.get(key).map(|r| r.payload.clone())
            }
            _ => None,
        }
    }
}
