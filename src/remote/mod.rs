//! Remote sources
//!
//! The core only needs three capabilities from a remote API: page through a
//! result set (`pagination::PageSource`), fetch one record by key
//! (`RecordSource`) and report the remaining call budget
//! (`quota::QuotaProbe`). `github` implements all three over HTTP.

pub mod github;

pub use github::{GithubClient, GithubMembers};

use crate::error::HarvestResult;
use async_trait::async_trait;

/// A freshly fetched payload and the quota reported with it
#[derive(Debug, Clone)]
pub struct Fetched<P> {
    pub payload: P,
    pub remaining_quota: Option<u32>,
}

/// Fetches a single record by key
#[async_trait]
pub trait RecordSource<P>: Send + Sync {
    async fn fetch_record(&self, key: &str) -> HarvestResult<Fetched<P>>;
}
