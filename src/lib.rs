//! zenfarm - dependency-aware action orchestrator for testnet farming
//!
//! Automates a chain of dependent remote actions (waitlist signup, faucet
//! claim, staking) for many independent accounts, with bounded concurrency
//! and jittered start times.
//!
//! # Architecture
//!
//! - Every action attempt is recorded in the store before execution and
//!   finalized right after the handler returns, so a crash mid-chain leaves
//!   a consistent, resumable trail
//! - Prerequisites are checked by kind with optional freshness bounds; a
//!   stale success means the kind is redone
//! - Handler failures are tagged outcomes, never exceptions; one account's
//!   fault cannot abort a batch
//!
//! # Modules
//!
//! - `domain`: Data structures (Account, Action, Outcome)
//! - `store`: SQLite persistence, one session per unit of work
//! - `core`: Orchestration logic (resolver, lifecycle, scheduler, retry)
//! - `handlers`: Remote endpoint integrations (waitlist, faucet, stake)
//! - `accounts`: Account import glue
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Import accounts with proxies
//! zenfarm import accounts.csv --proxies proxies.txt
//!
//! # Run one stake batch
//! zenfarm run stake --max-concurrent 5
//!
//! # Farm continuously
//! zenfarm farm --kind stake --interval-hours 23
//! ```

pub mod accounts;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod handlers;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{
    ActionLifecycle, DependencyResolver, DependencyRule, DependencySpec, EngineError,
    RetryPolicy, Scheduler, SchedulerConfig,
};
pub use domain::{Account, Action, ActionKind, ActionStatus, Outcome, OutcomeStatus};
pub use handlers::{ActionHandler, HandlerRegistry};
pub use store::{Session, Store};
