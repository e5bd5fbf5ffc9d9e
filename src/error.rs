//! Error types for harvest
//!
//! All modules use `HarvestResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for harvest operations
pub type HarvestResult<T> = Result<T, HarvestError>;

/// All errors that can occur in harvest
#[derive(Error, Debug)]
pub enum HarvestError {
    // Remote source errors
    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Remote returned status {status} for {endpoint}")]
    RemoteStatus {
        endpoint: String,
        status: u16,
        /// Quota the error response still reported
        remaining: Option<u32>,
    },

    #[error("Remote response malformed: {0}")]
    RemoteResponse(String),

    #[error("API token not found. Set the {0} environment variable")]
    TokenMissing(String),

    #[error("Pagination error: {0}")]
    Pagination(String),

    // Store errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Duplicate key {key} in table {table}")]
    DuplicateKey { table: String, key: String },

    #[error("Bulk write to {table} failed for {failed} of {total} batches: {first_cause}")]
    BulkWrite {
        table: String,
        failed: usize,
        total: usize,
        first_cause: String,
    },

    #[error("Store error: {0}")]
    Store(String),

    // Run control
    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl HarvestError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a remote call error
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(_) => true,
            Self::RemoteStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Remaining quota carried by a failed response, if any
    pub fn reported_quota(&self) -> Option<u32> {
        match self {
            Self::RemoteStatus { remaining, .. } => *remaining,
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::TokenMissing(_) => Some("Create a token at https://github.com/settings/tokens"),
            Self::TableNotFound(_) => Some("Run: harvest sync to create and seed the table"),
            Self::RemoteStatus { status: 401, .. } => Some("Check that the API token is valid"),
            Self::RemoteStatus { status: 403, .. } => {
                Some("The token may lack scopes or the rate limit is exhausted")
            }
            _ => None,
        }
    }
}
