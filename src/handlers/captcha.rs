//! Recaptcha solving via a 2captcha-compatible HTTP service.
//!
//! Invoked only from inside handlers; the orchestrator never sees it.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::debug;

/// How long a solve may poll before giving up.
const MAX_POLLS: u32 = 24;
const POLL_DELAY: Duration = Duration::from_secs(5);

/// Client for a 2captcha-compatible solving service.
pub struct CaptchaSolver {
    service_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    status: u8,
    request: String,
}

impl CaptchaSolver {
    pub fn new(service_url: String, api_key: String) -> Self {
        Self {
            service_url,
            api_key,
        }
    }

    /// Solve a recaptcha v2 widget on `page_url`.
    pub async fn solve_recaptcha_v2(
        &self,
        user_agent: &str,
        site_key: &str,
        page_url: &str,
        invisible: bool,
    ) -> Result<String> {
        let params = vec![
            ("method", "userrecaptcha".to_string()),
            ("googlekey", site_key.to_string()),
            ("pageurl", page_url.to_string()),
            ("invisible", if invisible { "1" } else { "0" }.to_string()),
            ("userAgent", user_agent.to_string()),
        ];
        self.solve(params).await
    }

    /// Solve a recaptcha v3 token for `page_url`.
    pub async fn solve_recaptcha_v3(
        &self,
        user_agent: &str,
        site_key: &str,
        page_url: &str,
    ) -> Result<String> {
        let params = vec![
            ("method", "userrecaptcha".to_string()),
            ("googlekey", site_key.to_string()),
            ("pageurl", page_url.to_string()),
            ("version", "v3".to_string()),
            ("userAgent", user_agent.to_string()),
        ];
        self.solve(params).await
    }

    async fn solve(&self, mut params: Vec<(&str, String)>) -> Result<String> {
        if self.api_key.is_empty() {
            anyhow::bail!("captcha API key is not configured");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build captcha client")?;

        params.push(("key", self.api_key.clone()));
        params.push(("json", "1".to_string()));

        let submitted: ServiceResponse = client
            .post(format!("{}/in.php", self.service_url))
            .form(&params)
            .send()
            .await
            .context("failed to submit captcha task")?
            .json()
            .await
            .context("invalid captcha submit response")?;

        if submitted.status != 1 {
            return Err(anyhow!("captcha task rejected: {}", submitted.request));
        }

        let task_id = submitted.request;
        debug!(%task_id, "captcha task submitted");

        for _ in 0..MAX_POLLS {
            tokio::time::sleep(POLL_DELAY).await;

            let polled: ServiceResponse = client
                .get(format!("{}/res.php", self.service_url))
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("action", "get"),
                    ("id", task_id.as_str()),
                    ("json", "1"),
                ])
                .send()
                .await
                .context("failed to poll captcha task")?
                .json()
                .await
                .context("invalid captcha poll response")?;

            if polled.status == 1 {
                return Ok(polled.request);
            }
            if polled.request != "CAPCHA_NOT_READY" {
                return Err(anyhow!("captcha task failed: {}", polled.request));
            }
        }

        Err(anyhow!("captcha task timed out after {} polls", MAX_POLLS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let solver = CaptchaSolver::new("https://2captcha.com".to_string(), String::new());
        let result = solver
            .solve_recaptcha_v2("Mozilla/5.0", "site-key", "https://example.com", false)
            .await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("API key is not configured"));
    }
}
