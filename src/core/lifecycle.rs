//! Action lifecycle: creation gated by dependencies, execution through the
//! handler registry, terminal transitions committed to the store.
//!
//! Handler failures are data, not errors: `execute_action` only returns
//! `Err` for store failures, everything the handler reports comes back as
//! an [`Outcome`].

use thiserror::Error;
use tracing::{error, info, instrument};

use crate::domain::{Account, Action, ActionKind, ActionStatus, Outcome};
use crate::handlers::HandlerRegistry;
use crate::store::Session;

use super::dependencies::DependencyResolver;

/// Typed failures of the orchestration engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Prerequisites for the kind are missing or stale at creation time.
    /// Recovered locally; no action record is written.
    #[error("dependencies not satisfied for action '{0}'")]
    DependencyNotSatisfied(ActionKind),

    /// No handler registered for the kind. A configuration defect, fatal to
    /// this action only.
    #[error("no handler registered for action '{0}'")]
    NoHandler(ActionKind),

    /// Persistence failure; propagates out of the unit and fails its outcome.
    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),
}

/// Creates action records and drives them to a terminal state.
pub struct ActionLifecycle {
    resolver: DependencyResolver,
    registry: HandlerRegistry,
}

impl ActionLifecycle {
    pub fn new(resolver: DependencyResolver, registry: HandlerRegistry) -> Self {
        Self { resolver, registry }
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Persist a new `Pending` action for `kind`, refusing with
    /// `DependencyNotSatisfied` when prerequisites are missing or stale at
    /// call time.
    pub fn create_action(
        &self,
        session: &mut Session,
        account: &Account,
        kind: ActionKind,
        payload: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Action, EngineError> {
        if !self.resolver.can_perform(session, account.id, kind)? {
            return Err(EngineError::DependencyNotSatisfied(kind));
        }

        let action = session.create_action(account.id, kind, &payload.unwrap_or_default())?;
        Ok(action)
    }

    /// Invoke the registered handler for the action's kind and commit the
    /// terminal transition. Callers distinguish success/failure via the
    /// returned outcome's `status` field, never via `Err`.
    #[instrument(skip(self, session, account, action), fields(account = %account.email, kind = %action.kind))]
    pub async fn execute_action(
        &self,
        session: &mut Session,
        account: &Account,
        action: &Action,
    ) -> Result<Outcome, EngineError> {
        let handler = self
            .registry
            .get(action.kind)
            .ok_or(EngineError::NoHandler(action.kind))?;

        // The handler owns its own retries and never raises past its
        // boundary.
        let outcome = handler.execute(account, action).await;

        let status = if outcome.is_success() {
            info!("action succeeded");
            ActionStatus::Success
        } else {
            error!(error = outcome.error.as_deref().unwrap_or(""), "action failed");
            ActionStatus::Failed
        };

        session.update_action_status(action.id, status, &outcome.payload_patch())?;

        Ok(outcome)
    }
}
