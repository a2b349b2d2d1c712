//! Action handlers for the remote endpoints.
//!
//! A handler owns all external I/O for one action kind and never raises
//! past its own boundary: any internal fault is converted into a failed
//! [`Outcome`]. The network client it uses lives exactly as long as one
//! invocation.

pub mod captcha;
pub mod faucet;
pub mod stake;
pub mod testing;
pub mod waitlist;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::Endpoints;
use crate::domain::{Account, Action, ActionKind, Outcome};

pub use captcha::CaptchaSolver;
pub use faucet::FaucetHandler;
pub use stake::StakeHandler;
pub use waitlist::WaitlistHandler;

/// A handler for one action kind.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Human-readable handler name
    fn name(&self) -> &str;

    /// Perform the remote operation. Must not panic or return early through
    /// an error path; every fault maps to `Outcome::failed`.
    async fn execute(&self, account: &Account, action: &Action) -> Outcome;
}

/// Explicit, constructed kind -> handler table.
///
/// Built once at startup and injected into the lifecycle manager, so tests
/// can swap in stubs.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// The production handler set for the testnet endpoints.
    pub fn testnet(endpoints: &Endpoints) -> Self {
        let solver = Arc::new(CaptchaSolver::new(
            endpoints.captcha_service_url.clone(),
            endpoints.captcha_api_key.clone(),
        ));

        let mut registry = Self::new();
        registry.register(
            ActionKind::Waitlist,
            Arc::new(WaitlistHandler::new(endpoints.clone(), Arc::clone(&solver))),
        );
        registry.register(
            ActionKind::Faucet,
            Arc::new(FaucetHandler::new(endpoints.clone(), Arc::clone(&solver))),
        );
        registry.register(
            ActionKind::Stake,
            Arc::new(StakeHandler::new(endpoints.clone())),
        );
        registry
    }
}

/// Build the scoped HTTP client for one handler invocation: the account's
/// header profile, its outbound proxy when set, and the transport timeouts
/// the remote endpoints tolerate.
pub(crate) fn client_for(account: &Account) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &account.headers {
        let Some(value) = value.as_str() else {
            continue;
        };
        let name: HeaderName = name
            .parse()
            .with_context(|| format!("invalid header name '{}'", name))?;
        let value: HeaderValue = value
            .parse()
            .with_context(|| format!("invalid header value for '{}'", name))?;
        headers.insert(name, value);
    }

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10));

    if let Some(proxy) = &account.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .with_context(|| format!("invalid proxy '{}'", proxy))?;
        builder = builder.proxy(proxy);
    }

    builder.build().context("failed to build HTTP client")
}
