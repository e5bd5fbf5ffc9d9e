//! CLI command implementations

pub mod config;
pub mod lookup;
pub mod members;
pub mod sync;

pub use config::execute as config;
pub use lookup::execute as lookup;
pub use members::execute as members;
pub use sync::execute as sync;

use crate::config::{Config, ConfigManager};
use crate::error::{HarvestError, HarvestResult};
use crate::quota::{QuotaGate, QuotaState};
use crate::remote::{GithubClient, GithubMembers};
use crate::store::{JsonFileStore, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;

/// Organisation from `--org`, falling back to `github.org`
pub(crate) fn organisation(arg: Option<String>, config: &Config) -> HarvestResult<String> {
    arg.or_else(|| config.github.org.clone())
        .filter(|org| !org.trim().is_empty())
        .ok_or_else(|| {
            HarvestError::User("No organisation configured. Pass --org or set github.org".into())
        })
}

pub(crate) fn github_client(config: &Config) -> HarvestResult<GithubClient> {
    GithubClient::from_config(&config.github)
}

/// Gate for member listings, probing GraphQL points
///
/// The listing reserve is the pagination margin, so the state carries no floor.
pub(crate) fn member_gate(members: Arc<GithubMembers>, config: &Config) -> QuotaGate {
    QuotaGate::new(members, QuotaState::new(config.quota.assumed_remaining, 0))
        .with_backoff(Duration::from_secs(config.quota.backoff_secs))
}

/// Table store rooted at the configured directory
pub(crate) async fn open_store(config: &Config) -> HarvestResult<Arc<dyn KeyValueStore>> {
    let store = JsonFileStore::open(ConfigManager::store_dir(config)).await?;
    Ok(Arc::new(store))
}
