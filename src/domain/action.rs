//! Actions and execution outcomes.
//!
//! An action records exactly one attempt to perform a remote operation for
//! one account. It is created in `Pending` immediately before execution and
//! finalized synchronously after the handler returns; the only mutation a
//! terminal action sees is payload enrichment at the moment of transition.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of remote operations the engine knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Waitlist,
    Faucet,
    Stake,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Waitlist => "waitlist",
            ActionKind::Faucet => "faucet",
            ActionKind::Stake => "stake",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waitlist" => Ok(ActionKind::Waitlist),
            "faucet" => Ok(ActionKind::Faucet),
            "stake" => Ok(ActionKind::Stake),
            other => Err(format!("unknown action kind '{}'", other)),
        }
    }
}

/// Lifecycle status of an action. Transitions only Pending -> Success|Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Success,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Success => "success",
            ActionStatus::Failed => "failed",
        }
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "success" => Ok(ActionStatus::Success),
            "failed" => Ok(ActionStatus::Failed),
            other => Err(format!("unknown action status '{}'", other)),
        }
    }
}

/// One recorded attempt at a remote operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,

    /// Owning account (many actions per account, kept as history)
    pub account_id: i64,

    pub kind: ActionKind,

    pub status: ActionStatus,

    /// Opaque result payload; handler output is merged in at the terminal
    /// transition
    pub payload: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Tag for an execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Result of executing one action, surfaced to callers without raising.
///
/// Handlers and the layers above them communicate exclusively through this
/// type; a failure is data, not an exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,

    /// Human-readable reason when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Kind-specific fields (tx hash, drip amount, waitlist message, ...)
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            status: OutcomeStatus::Success,
            error: None,
            data: serde_json::Map::new(),
        }
    }

    pub fn success_with(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            error: None,
            data,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
            data: serde_json::Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Fields recorded onto the action payload at the terminal transition.
    pub fn payload_patch(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut patch = self.data.clone();
        patch.insert(
            "status".to_string(),
            serde_json::Value::String(
                match self.status {
                    OutcomeStatus::Success => "success",
                    OutcomeStatus::Failed => "failed",
                }
                .to_string(),
            ),
        );
        if let Some(error) = &self.error {
            patch.insert(
                "error".to_string(),
                serde_json::Value::String(error.clone()),
            );
        }
        patch
    }
}
