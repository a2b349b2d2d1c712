//! Test doubles for the handler registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Account, Action, Outcome};

use super::ActionHandler;

/// Scripted handler: returns a fixed outcome and counts invocations.
/// Optionally holds each call open so tests can observe concurrency.
pub struct StubHandler {
    outcome: Outcome,
    hold: Option<Duration>,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl StubHandler {
    pub fn succeeding() -> Self {
        Self::with_outcome(Outcome::success())
    }

    pub fn succeeding_with(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::with_outcome(Outcome::success_with(data))
    }

    pub fn failing(error: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::failed(error))
    }

    pub fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            hold: None,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Keep each execution open for `duration` so overlapping calls are
    /// observable through [`StubHandler::max_in_flight`].
    pub fn holding(mut self, duration: Duration) -> Self {
        self.hold = Some(duration);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of executions that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for StubHandler {
    fn name(&self) -> &str {
        "stub"
    }

    async fn execute(&self, _account: &Account, _action: &Action) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(hold) = self.hold {
            tokio::time::sleep(hold).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
