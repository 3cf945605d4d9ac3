//! Top-N universe provider.
//!
//! Ranks tradeable symbols by 24h quote volume against a Binance-style
//! REST endpoint (`/api/v3/ticker/24hr`). Transient HTTP failures are
//! retried through the shared retry helper; an HTTP-level failure after
//! retries is an error, while a *successful* response with no matching
//! symbols is the distinct empty-universe outcome the coordinator treats
//! as fatal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::UniverseProvider;
use crate::coordinator::retry::{retry, RetryClass, RetryPolicy};

/// Raw 24h ticker row as returned by the exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    /// Quote-asset volume, stringly-typed on the wire.
    #[serde(rename = "quoteVolume")]
    pub quote_volume: String,
}

pub struct VolumeRankedUniverse {
    client: reqwest::Client,
    base_url: String,
    quote_asset: String,
    retry_policy: RetryPolicy,
}

impl VolumeRankedUniverse {
    pub fn new(base_url: &str, quote_asset: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build universe HTTP client")?;

        Ok(VolumeRankedUniverse {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            quote_asset: quote_asset.to_string(),
            retry_policy: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
            },
        })
    }

    async fn fetch_tickers(&self) -> Result<Vec<Ticker24h>> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Ticker request failed")?;

        if resp.status().is_server_error() {
            anyhow::bail!("transient: ticker endpoint returned {}", resp.status());
        }
        if !resp.status().is_success() {
            anyhow::bail!("ticker endpoint returned {}", resp.status());
        }

        resp.json::<Vec<Ticker24h>>()
            .await
            .context("Failed to decode ticker response")
    }
}

/// Pure ranking step, split out for testability: keep symbols quoted in
/// `quote_asset`, sort by quote volume descending, take the first `n`.
pub fn select_top(tickers: &[Ticker24h], quote_asset: &str, n: usize) -> Vec<String> {
    let mut ranked: Vec<(&str, f64)> = tickers
        .iter()
        .filter(|t| t.symbol.ends_with(quote_asset))
        .map(|t| (t.symbol.as_str(), t.quote_volume.parse::<f64>().unwrap_or(0.0)))
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(n).map(|(s, _)| s.to_string()).collect()
}

#[async_trait]
impl UniverseProvider for VolumeRankedUniverse {
    async fn top_symbols(&self, n: usize) -> Result<Vec<String>> {
        let tickers = retry(
            &self.retry_policy,
            |e: &anyhow::Error| {
                if e.to_string().contains("transient") {
                    RetryClass::Transient
                } else {
                    RetryClass::Fatal
                }
            },
            || self.fetch_tickers(),
        )
        .await?;

        debug!(raw = tickers.len(), "Ticker rows fetched");
        let top = select_top(&tickers, &self.quote_asset, n);
        info!(requested = n, selected = top.len(), "Top-N universe resolved");
        Ok(top)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
