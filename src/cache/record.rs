//! Typed cache records

use crate::error::HarvestResult;
use crate::store::StoredEntity;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Schema of a cache's payload
///
/// `Default` is the placeholder written for keys that were discovered but
/// never fetched.
pub trait Payload:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

impl<T> Payload for T where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

/// One cached entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord<P> {
    /// Stable identifier, unique within the cache
    pub key: String,

    /// Cached fields
    pub payload: P,

    /// Last successful refresh; `None` if never refreshed
    pub last_updated: Option<DateTime<Utc>>,
}

impl<P: Payload> CachedRecord<P> {
    /// Decode a stored row
    pub fn from_stored(entity: StoredEntity) -> HarvestResult<Self> {
        let payload = if entity.payload.is_null() {
            P::default()
        } else {
            serde_json::from_value(entity.payload)?
        };

        Ok(Self {
            key: entity.key,
            payload,
            last_updated: entity.last_updated,
        })
    }

    /// Whether the record has ever been refreshed
    pub fn is_placeholder(&self) -> bool {
        self.last_updated.is_none()
    }
}
