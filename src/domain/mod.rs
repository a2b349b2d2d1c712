//! Domain types for the zenfarm orchestrator.
//!
//! This module contains the core data structures:
//! - Account: a farming identity (address, credentials, proxy, headers)
//! - Action: one recorded attempt at a remote operation
//! - Outcome: the tagged success/failure result of executing an action

pub mod account;
pub mod action;

// Re-export commonly used types
pub use account::{Account, NewAccount};
pub use action::{Action, ActionKind, ActionStatus, Outcome, OutcomeStatus};
