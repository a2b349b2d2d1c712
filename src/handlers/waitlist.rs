//! Waitlist signup handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::Endpoints;
use crate::core::RetryPolicy;
use crate::domain::{Account, Action, Outcome};

use super::{client_for, ActionHandler, CaptchaSolver};

pub struct WaitlistHandler {
    endpoints: Endpoints,
    solver: Arc<CaptchaSolver>,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct WaitlistResponse {
    message: Option<String>,
}

impl WaitlistHandler {
    pub fn new(endpoints: Endpoints, solver: Arc<CaptchaSolver>) -> Self {
        Self {
            endpoints,
            solver,
            retry: RetryPolicy::transport(),
        }
    }

    async fn run(&self, account: &Account) -> anyhow::Result<Outcome> {
        // Client lives exactly as long as this invocation
        let client = client_for(account)?;

        let token = self
            .solver
            .solve_recaptcha_v2(
                account.header("User-Agent"),
                &self.endpoints.waitlist_site_key,
                &self.endpoints.waitlist_page_url,
                false,
            )
            .await?;

        let body = serde_json::json!({
            "address": account.address,
            "email": account.email,
            "recaptchaToken": token,
        });

        let response = self
            .retry
            .run("waitlist", |_attempt| {
                let client = &client;
                let body = &body;
                async move {
                    client
                        .post(&self.endpoints.waitlist_url)
                        .json(body)
                        .send()
                        .await
                }
            })
            .await?;

        let status = response.status();
        let parsed: WaitlistResponse = response.json().await?;
        let message = parsed.message.unwrap_or_default();

        if message.contains("Successfully added to waitlist") {
            info!(account = %account.email, "waitlist signup succeeded");
            let mut data = serde_json::Map::new();
            data.insert("message".to_string(), serde_json::Value::String(message));
            Ok(Outcome::success_with(data))
        } else {
            Ok(Outcome::failed(format!("HTTP {}: {}", status, message)))
        }
    }
}

#[async_trait]
impl ActionHandler for WaitlistHandler {
    fn name(&self) -> &str {
        "waitlist"
    }

    async fn execute(&self, account: &Account, _action: &Action) -> Outcome {
        match self.run(account).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::failed(format!("{:#}", e)),
        }
    }
}
