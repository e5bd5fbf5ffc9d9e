//! Configuration schema for harvest
//!
//! Configuration is stored at `~/.config/harvest/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// GitHub API settings
    pub github: GithubConfig,

    /// Quota gate settings
    pub quota: QuotaConfig,

    /// Persistent store settings
    pub store: StoreConfig,

    /// Last-activity cache
    pub activity: CacheConfig,

    /// Profile cache
    pub profile: CacheConfig,
}

impl Config {
    /// Resolved settings for a named cache
    pub fn cache(&self, kind: CacheKind) -> CacheSettings {
        let section = match kind {
            CacheKind::Activity => &self.activity,
            CacheKind::Profile => &self.profile,
        };
        section.resolve(kind)
    }
}

/// The bundled caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Most recent public activity per user
    Activity,
    /// Public profile attributes per user
    Profile,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// GitHub API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// REST base URL; GraphQL is served at `<api_url>/graphql`
    pub api_url: String,

    /// Environment variable holding the API token
    pub token_env: String,

    /// Organisation whose members are harvested
    pub org: Option<String>,

    /// Members requested per page (max 100)
    pub page_size: u32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            org: None,
            page_size: 100,
            timeout_secs: 30,
        }
    }
}

/// Quota gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Seconds to wait before re-probing an insufficient budget
    pub backoff_secs: u64,

    /// Extra calls reserved on top of a traversal's page estimate
    pub pagination_margin: u32,

    /// Listing calls assumed remaining before the remote has reported any
    pub assumed_remaining: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 60,
            pagination_margin: 10,
            assumed_remaining: 5000,
        }
    }
}

/// Persistent store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for table files (default: data dir)
    pub path: Option<PathBuf>,
}

/// Settings for one cache instance
///
/// Unset values fall back to the defaults of the cache kind, see
/// `CacheKind::defaults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the cache for lookups (false = always call the remote)
    pub enabled: bool,

    /// Table name in the store
    pub table: Option<String>,

    /// Days before a record counts as stale
    pub freshness_days: Option<u32>,

    /// Maximum records refreshed per sync run
    pub refresh_budget: Option<usize>,

    /// Remaining calls below which a run stops refreshing
    pub safety_floor: Option<u32>,

    /// Remaining calls assumed before the remote has reported any
    pub assumed_remaining: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: None,
            freshness_days: None,
            refresh_budget: None,
            safety_floor: None,
            assumed_remaining: 5000,
        }
    }
}

impl CacheConfig {
    /// Fill unset values from the kind's defaults
    pub fn resolve(&self, kind: CacheKind) -> CacheSettings {
        let defaults = kind.defaults();
        CacheSettings {
            enabled: self.enabled,
            table: self.table.clone().unwrap_or(defaults.table),
            freshness_days: self.freshness_days.unwrap_or(defaults.freshness_days),
            refresh_budget: self.refresh_budget.unwrap_or(defaults.refresh_budget),
            safety_floor: self.safety_floor.unwrap_or(defaults.safety_floor),
            assumed_remaining: self.assumed_remaining,
        }
    }
}

/// Fully resolved settings for one cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub table: String,
    pub freshness_days: u32,
    pub refresh_budget: usize,
    pub safety_floor: u32,
    pub assumed_remaining: u32,
}

impl CacheKind {
    /// Documented defaults per cache
    ///
    /// | Cache | Table | Fresh (days) | Budget | Floor |
    /// |-------|-------|--------------|--------|-------|
    /// | activity | userActivity | 7 | 1750 | 25 |
    /// | profile | userProfiles | 30 | 2000 | 5 |
    pub fn defaults(&self) -> CacheSettings {
        match self {
            Self::Activity => CacheSettings {
                enabled: true,
                table: "userActivity".to_string(),
                freshness_days: 7,
                refresh_budget: 1750,
                safety_floor: 25,
                assumed_remaining: 5000,
            },
            Self::Profile => CacheSettings {
                enabled: true,
                table: "userProfiles".to_string(),
                freshness_days: 30,
                refresh_budget: 2000,
                safety_floor: 5,
                assumed_remaining: 5000,
            },
        }
    }
}
