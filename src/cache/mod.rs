//! Staleness-bounded record cache
//!
//! Records live in a store table and are loaded once per run into an
//! in-memory working set. The working set is refreshed in place by
//! `RefreshScheduler` and read by `CacheBackedLookup`.
//!
//! # Record lifecycle
//!
//! | State | `last_updated` | Written by |
//! |-------|----------------|------------|
//! | Placeholder | `None` | `bulk_insert_if_absent` |
//! | Fresh | within window | `upsert` after a remote fetch |
//! | Stale | older than window | (time passing) |

pub mod lookup;
pub mod record;
pub mod refresh;
pub mod staleness;
pub mod table;

pub use lookup::{CacheBackedLookup, LookupAction};
pub use record::{CachedRecord, Payload};
pub use refresh::{RefreshReport, RefreshScheduler};
pub use staleness::{days_since, is_stale, StalenessPolicy};
pub use table::{BulkInsertSummary, KeyValueCache};
