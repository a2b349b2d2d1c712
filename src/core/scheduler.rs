//! Bounded-concurrency batch scheduler.
//!
//! Fans one unit of work out per active account, guarded by a global
//! semaphore. Each unit jitters its start, opens its own store session,
//! executes missing dependencies in declaration order and then the target
//! action, and reports a per-account outcome. One unit's fault never aborts
//! its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Account, ActionKind, Outcome};
use crate::store::{Session, Store};

use super::lifecycle::ActionLifecycle;

/// Outcome key used when a batch fails before any account is processed.
pub const BATCH_KEY: &str = "batch";

/// Timing knobs for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on simultaneously running units across the whole batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Start jitter is drawn uniformly from
    /// [0, max_concurrent * start_jitter_secs_per_slot] seconds, smearing
    /// request starts so the remote endpoints never see a burst
    #[serde(default = "default_start_jitter")]
    pub start_jitter_secs_per_slot: u64,

    /// Uniform [min, max] delay in seconds before each action execution
    #[serde(default = "default_execution_delay")]
    pub execution_delay_secs: [u64; 2],
}

fn default_max_concurrent() -> usize {
    10
}
fn default_start_jitter() -> u64 {
    10
}
fn default_execution_delay() -> [u64; 2] {
    [1, 5]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            start_jitter_secs_per_slot: default_start_jitter(),
            execution_delay_secs: default_execution_delay(),
        }
    }
}

impl SchedulerConfig {
    /// All delays zeroed; used by tests so batches run without sleeping.
    pub fn immediate(max_concurrent_tasks: usize) -> Self {
        Self {
            max_concurrent_tasks,
            start_jitter_secs_per_slot: 0,
            execution_delay_secs: [0, 0],
        }
    }

    /// Reorder the delay pair so a swapped config value cannot invert the
    /// sampling range.
    pub fn normalized(mut self) -> Self {
        self.execution_delay_secs.sort_unstable();
        self
    }
}

/// Top-level batch driver.
pub struct Scheduler {
    store: Store,
    lifecycle: Arc<ActionLifecycle>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(store: Store, lifecycle: ActionLifecycle, config: SchedulerConfig) -> Self {
        Self {
            store,
            lifecycle: Arc::new(lifecycle),
            config: config.normalized(),
        }
    }

    /// Run `target` for every active account, at most
    /// `config.max_concurrent_tasks` units at a time. Returns a mapping of
    /// account email to outcome; the batch itself fails only when the
    /// account list cannot be read.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn run_for_all_active(
        &self,
        target: ActionKind,
    ) -> Result<BTreeMap<String, Outcome>> {
        let accounts = self
            .store
            .session()?
            .list_active_accounts()
            .context("failed to load active accounts")?;

        if accounts.is_empty() {
            warn!("no active accounts found");
            let mut outcomes = BTreeMap::new();
            outcomes.insert(
                BATCH_KEY.to_string(),
                Outcome::failed("no active accounts found"),
            );
            return Ok(outcomes);
        }

        let batch_id = Uuid::new_v4();
        info!(
            %batch_id,
            accounts = accounts.len(),
            max_concurrent = self.config.max_concurrent_tasks,
            "starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks.max(1)));
        let mut units: Vec<(String, JoinHandle<Outcome>)> = Vec::with_capacity(accounts.len());

        for account in accounts {
            let semaphore = Arc::clone(&semaphore);
            let lifecycle = Arc::clone(&self.lifecycle);
            let store = self.store.clone();
            let config = self.config.clone();
            let email = account.email.clone();

            let handle = tokio::spawn(async move {
                run_unit(&store, &lifecycle, &config, &semaphore, &account, target).await
            });
            units.push((email, handle));
        }

        let mut outcomes = BTreeMap::new();
        for (email, handle) in units {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                // A panicked unit fails its own outcome slot, nothing else.
                Err(e) => {
                    warn!(account = %email, error = %e, "unit of work panicked");
                    Outcome::failed(format!("unit of work panicked: {}", e))
                }
            };
            outcomes.insert(email, outcome);
        }

        info!(%batch_id, outcomes = outcomes.len(), "batch finished");
        Ok(outcomes)
    }
}

/// One per-account unit: jitter, acquire a slot, resolve dependencies,
/// execute them in order, then the target. Stops at the first failure.
async fn run_unit(
    store: &Store,
    lifecycle: &ActionLifecycle,
    config: &SchedulerConfig,
    semaphore: &Semaphore,
    account: &Account,
    target: ActionKind,
) -> Outcome {
    let jitter_bound = config.max_concurrent_tasks as u64 * config.start_jitter_secs_per_slot;
    sleep_jitter(0, jitter_bound).await;

    let _permit = match semaphore.acquire().await {
        Ok(permit) => permit,
        Err(_) => return Outcome::failed("scheduler shut down"),
    };

    debug!(account = %account.email, "unit admitted");

    // Independent session per unit; sharing one across concurrent writers
    // corrupts or stalls the whole batch. The session is threaded through
    // exclusively so the unit future stays Send.
    let mut session = match store.session() {
        Ok(session) => session,
        Err(e) => return Outcome::failed(format!("store failure: {:#}", e)),
    };

    match run_chain(lifecycle, config, &mut session, account, target).await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::failed(e.to_string()),
    }
}

async fn run_chain(
    lifecycle: &ActionLifecycle,
    config: &SchedulerConfig,
    session: &mut Session,
    account: &Account,
    target: ActionKind,
) -> Result<Outcome, super::lifecycle::EngineError> {
    let missing = lifecycle
        .resolver()
        .missing_dependencies(session, account.id, target)?;

    if !missing.is_empty() {
        info!(account = %account.email, ?missing, "executing missing dependencies");
    }

    for kind in missing {
        let outcome = perform(lifecycle, config, session, account, kind).await?;
        if !outcome.is_success() {
            // Later dependencies assume this one succeeded; stop here and
            // report the dependency's failure for the whole unit.
            return Ok(outcome);
        }
    }

    perform(lifecycle, config, session, account, target).await
}

/// Create and execute one action, with the configured pre-execution jitter.
async fn perform(
    lifecycle: &ActionLifecycle,
    config: &SchedulerConfig,
    session: &mut Session,
    account: &Account,
    kind: ActionKind,
) -> Result<Outcome, super::lifecycle::EngineError> {
    let action = lifecycle.create_action(session, account, kind, None)?;

    let [min, max] = config.execution_delay_secs;
    sleep_jitter(min, max).await;

    lifecycle.execute_action(session, account, &action).await
}

async fn sleep_jitter(min_secs: u64, max_secs: u64) {
    if max_secs == 0 {
        return;
    }
    let secs = rand::thread_rng().gen_range(min_secs..=max_secs);
    if secs > 0 {
        debug!(secs, "jitter sleep");
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent_tasks, 10);
        assert_eq!(config.start_jitter_secs_per_slot, 10);
        assert_eq!(config.execution_delay_secs, [1, 5]);
    }

    #[test]
    fn test_immediate_config_has_no_delays() {
        let config = SchedulerConfig::immediate(4);
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.start_jitter_secs_per_slot, 0);
        assert_eq!(config.execution_delay_secs, [0, 0]);
    }

    #[test]
    fn test_inverted_delay_range_is_reordered() {
        let config = SchedulerConfig {
            execution_delay_secs: [5, 2],
            ..SchedulerConfig::default()
        }
        .normalized();
        assert_eq!(config.execution_delay_secs, [2, 5]);

        // Already-ordered pairs pass through unchanged
        let config = SchedulerConfig::default().normalized();
        assert_eq!(config.execution_delay_secs, [1, 5]);
    }
}
