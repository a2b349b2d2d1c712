//! Staking handler.
//!
//! Submits a stake request for a random share of the account's balance to
//! the staking endpoint. Transaction construction happens server-side; this
//! handler is a thin signed call like the other two.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::config::Endpoints;
use crate::core::RetryPolicy;
use crate::domain::{Account, Action, Outcome};

use super::{client_for, ActionHandler};

/// Stake between 40% and 77% of the balance, varied per run so account
/// activity does not look scripted.
const STAKE_PERCENT_RANGE: (f64, f64) = (40.0, 77.0);

pub struct StakeHandler {
    endpoints: Endpoints,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct StakeResponse {
    status: Option<i64>,
    #[serde(rename = "transactionHash")]
    transaction_hash: Option<String>,
    #[serde(rename = "blockNumber")]
    block_number: Option<u64>,
    #[serde(rename = "gasUsed")]
    gas_used: Option<u64>,
}

impl StakeHandler {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            retry: RetryPolicy::transport(),
        }
    }

    async fn run(&self, account: &Account) -> anyhow::Result<Outcome> {
        let client = client_for(account)?;

        let percent = rand::thread_rng().gen_range(STAKE_PERCENT_RANGE.0..STAKE_PERCENT_RANGE.1);
        let body = serde_json::json!({
            "address": account.address,
            "privateKey": account.private_key,
            "stakeAmount": format!("{}%", percent),
            "rewardDestination": 0,
        });

        let response = self
            .retry
            .run("stake", |_attempt| {
                let client = &client;
                let body = &body;
                async move {
                    client
                        .post(&self.endpoints.stake_url)
                        .json(body)
                        .send()
                        .await
                }
            })
            .await?;

        let parsed: StakeResponse = response.json().await?;

        match parsed {
            StakeResponse {
                status: Some(1),
                transaction_hash: Some(hash),
                block_number,
                gas_used,
            } => {
                info!(account = %account.email, tx = %hash, "stake succeeded");
                let mut data = serde_json::Map::new();
                data.insert(
                    "transaction_hash".to_string(),
                    serde_json::Value::String(hash),
                );
                data.insert(
                    "block_number".to_string(),
                    serde_json::Value::from(block_number.unwrap_or(0)),
                );
                data.insert(
                    "gas_used".to_string(),
                    serde_json::Value::from(gas_used.unwrap_or(0)),
                );
                Ok(Outcome::success_with(data))
            }
            other => Ok(Outcome::failed(format!(
                "staking transaction failed: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl ActionHandler for StakeHandler {
    fn name(&self) -> &str {
        "stake"
    }

    async fn execute(&self, account: &Account, _action: &Action) -> Outcome {
        match self.run(account).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::failed(format!("{:#}", e)),
        }
    }
}
