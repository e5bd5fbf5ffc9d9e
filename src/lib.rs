//! Harvest - quota-aware GitHub organisation harvester
//!
//! Walks paginated remote listings without exhausting the API rate limit
//! and keeps a staleness-bounded key-value cache of per-user records,
//! refreshing the stalest entries first within a per-run budget.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod pagination;
pub mod payload;
pub mod quota;
pub mod remote;
pub mod store;
pub mod sync;

pub use error::{HarvestError, HarvestResult};
