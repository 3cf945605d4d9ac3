//! HTTP client for the external research/scoring engine.
//!
//! The engine's indicator math and data fan-out are opaque to this
//! crate; we POST a (symbol, account) pair and decode the verdict. The
//! coordinator races each call against its own hard deadline, but the
//! client also carries a request timeout so an abandoned call cannot
//! hold a connection open indefinitely.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::ResearchService;
use crate::types::{AccountContext, ResearchVerdict};

/// Slightly above the coordinator's research deadline so the race in
/// the per-symbol pipeline, not this client, decides timeouts.
const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize)]
struct ResearchRequest<'a> {
    symbol: &'a str,
    account_id: &'a str,
}

pub struct ResearchHttpClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ResearchHttpClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build research HTTP client")?;

        Ok(ResearchHttpClient {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ResearchService for ResearchHttpClient {
    async fn run(&self, symbol: &str, account: &AccountContext) -> Result<ResearchVerdict> {
        let mut req = self.client.post(&self.endpoint).json(&ResearchRequest {
            symbol,
            account_id: &account.id,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("Research request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("research engine returned {}", resp.status());
        }

        let verdict: ResearchVerdict = resp
            .json()
            .await
            .context("Failed to decode research verdict")?;

        debug!(
            symbol,
            account = %account.id,
            confidence = verdict.confidence,
            side = %verdict.side,
            "Research verdict received"
        );
        Ok(verdict)
    }
}
