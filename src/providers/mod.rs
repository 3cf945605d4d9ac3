//! External collaborator interfaces.
//!
//! The coordinator consumes these as opaque capabilities: universe
//! ranking, research scoring, pre-trade risk, and order execution. The
//! scoring internals, provider fallback chains, and exchange wire
//! protocols are out of scope — implementations here are deliberately
//! thin (an HTTP client each) plus a paper venue for dry runs and tests.

pub mod paper;
pub mod research;
pub mod risk;
pub mod topn;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    AccountContext, AccountSnapshot, OrderAck, OrderRequest, ResearchVerdict, RiskAssessment,
    Ticker,
};

pub use paper::PaperExchange;
pub use research::ResearchHttpClient;
pub use risk::BasicRiskGate;
pub use topn::VolumeRankedUniverse;

/// Ordered candidate symbol list.
///
/// An empty list is a distinct, non-error outcome: the coordinator
/// treats it as fatal to the run (provider outage, fail loud).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UniverseProvider: Send + Sync {
    async fn top_symbols(&self, n: usize) -> Result<Vec<String>>;
}

/// symbol + account → research verdict.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResearchService: Send + Sync {
    async fn run(&self, symbol: &str, account: &AccountContext) -> Result<ResearchVerdict>;
}

/// Pre-trade affordability/exposure check.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RiskGate: Send + Sync {
    async fn can_trade(
        &self,
        account_id: &str,
        symbol: &str,
        qty: f64,
        price: f64,
        assumed_adverse_move_pct: f64,
    ) -> Result<RiskAssessment>;
}

/// Order placement and account/ticker queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn place_order(&self, account_id: &str, order: &OrderRequest) -> Result<OrderAck>;

    async fn account(&self, account_id: &str) -> Result<AccountSnapshot>;

    async fn ticker(&self, symbol: &str) -> Result<Ticker>;
}
