//! Freshness decisions for cached records
//!
//! Age is counted in whole days, rounded up: a record refreshed 2.01 days ago
//! is 3 days old. A record that was never refreshed is always stale.

use super::record::CachedRecord;
use chrono::{DateTime, Duration, Utc};

/// Whole days elapsed since `then`, rounded up; never negative
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed = now - then;
    if elapsed <= Duration::zero() {
        return 0;
    }
    let whole = elapsed.num_days();
    if elapsed > Duration::days(whole) {
        whole + 1
    } else {
        whole
    }
}

/// Stale if never updated or older than `window_days`
pub fn is_stale<P>(record: &CachedRecord<P>, window_days: u32, now: DateTime<Utc>) -> bool {
    match record.last_updated {
        None => true,
        Some(updated) => days_since(updated, now) > i64::from(window_days),
    }
}

/// Freshness window for one cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    window_days: u32,
}

impl StalenessPolicy {
    pub fn new(window_days: u32) -> Self {
        Self { window_days }
    }

    /// Whether `record` needs a refresh at `now`
    pub fn is_stale<P>(&self, record: &CachedRecord<P>, now: DateTime<Utc>) -> bool {
        is_stale(record, self.window_days, now)
    }
}
