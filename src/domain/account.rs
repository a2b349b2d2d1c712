//! Farming accounts.
//!
//! An account is created once by the import step and read by the scheduler
//! on every batch. The core only ever flips `active` or refreshes the header
//! profile; accounts are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A farming identity persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Store rowid
    pub id: i64,

    /// Unique email, used as the account identifier in outcome maps
    pub email: String,

    /// Unique on-chain address
    pub address: String,

    /// Signing key for the staking endpoint
    pub private_key: String,

    /// Outbound proxy URL, if the account routes through one
    pub proxy: Option<String>,

    /// Per-identity HTTP header profile (User-Agent etc.)
    pub headers: serde_json::Map<String, serde_json::Value>,

    /// Only active accounts are eligible for batch runs
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields required to insert a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub address: String,
    pub private_key: String,
    pub proxy: Option<String>,
    pub headers: serde_json::Map<String, serde_json::Value>,
}

impl Account {
    /// Header value for a given name, empty string if unset or not a string.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }
}
