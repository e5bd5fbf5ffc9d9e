//! Payload schemas for the bundled caches
//!
//! Each cache declares its own payload type; the store only sees JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most recent public activity for a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityPayload {
    /// Timestamp of the newest public event
    pub last_activity: Option<DateTime<Utc>>,

    /// Event type of the newest public event (e.g. "PushEvent")
    pub last_event_type: Option<String>,

    /// Repository the newest event touched
    pub last_repo: Option<String>,
}

/// Public profile attributes for a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePayload {
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub twitter_username: Option<String>,
    pub public_repos: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
}
