//! Shared types for the ROTOR scheduler.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that store, provider, and
//! coordinator modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sides and research outcomes
// ---------------------------------------------------------------------------

/// Directional view on a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
    Neutral,
}

impl Side {
    /// The closing side for a position opened on this side.
    /// Neutral has no opposite — it is never tradeable.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
            Side::Neutral => Side::Neutral,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
            Side::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Whether the research engine had enough data to form a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchStatus {
    SufficientData,
    InsufficientData,
}

/// Counts of independent signal categories agreeing with the primary side.
///
/// "Major" signals are the heavyweight categories (trend, momentum,
/// derivatives positioning); "minor" signals are supporting ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfluenceFlags {
    pub major_agreeing: u32,
    pub minor_agreeing: u32,
}

/// Answer from the external research engine for one (symbol, account).
///
/// The scoring internals are opaque to the coordinator; only the fields
/// the decision gate consumes are modelled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchVerdict {
    /// Confidence score, 0–100.
    pub confidence: f64,
    pub side: Side,
    pub status: ResearchStatus,
    #[serde(default)]
    pub confluence: ConfluenceFlags,
    #[serde(default)]
    pub volume_confirmed: bool,
    /// Veto flag: derivatives positioning contradicts the price signal.
    #[serde(default)]
    pub derivatives_contradict: bool,
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub summary: String,
}

impl ResearchVerdict {
    /// Helper to build a verdict that passes every gate predicate.
    #[cfg(test)]
    pub fn sample_long(confidence: f64) -> Self {
        ResearchVerdict {
            confidence,
            side: Side::Long,
            status: ResearchStatus::SufficientData,
            confluence: ConfluenceFlags {
                major_agreeing: 3,
                minor_agreeing: 4,
            },
            volume_confirmed: true,
            derivatives_contradict: false,
            entry: Some(50_000.0),
            stop_loss: Some(48_500.0),
            take_profit: Some(53_000.0),
            summary: "test verdict".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision gate output
// ---------------------------------------------------------------------------

/// The first unmet predicate when a candidate is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RejectReason {
    AutoTradeDisabled,
    InsufficientData,
    BelowThreshold { confidence: f64, threshold: f64 },
    NeutralSide,
    NoConfluence { major: u32, minor: u32 },
    VolumeUnconfirmed,
    DerivativesVeto,
    DuplicateTrade { minutes_since_last: i64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::AutoTradeDisabled => write!(f, "auto-trade disabled"),
            RejectReason::InsufficientData => write!(f, "insufficient research data"),
            RejectReason::BelowThreshold {
                confidence,
                threshold,
            } => write!(
                f,
                "confidence {confidence:.1} below threshold {threshold:.1}"
            ),
            RejectReason::NeutralSide => write!(f, "side is NEUTRAL"),
            RejectReason::NoConfluence { major, minor } => write!(
                f,
                "confluence not met ({major} major / {minor} minor agreeing)"
            ),
            RejectReason::VolumeUnconfirmed => write!(f, "volume confirmation missing"),
            RejectReason::DerivativesVeto => {
                write!(f, "derivatives contradict price signal")
            }
            RejectReason::DuplicateTrade { minutes_since_last } => write!(
                f,
                "duplicate: same symbol traded {minutes_since_last}m ago"
            ),
        }
    }
}

/// Outcome of the auto-trade decision gate for one research verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTradeDecision {
    pub triggered: bool,
    pub confidence: f64,
    pub threshold: f64,
    /// Set only when `triggered` is false.
    pub rejection: Option<RejectReason>,
    /// Human-readable form of the decision, for telemetry records.
    pub reason: String,
}

impl AutoTradeDecision {
    pub fn triggered(confidence: f64, threshold: f64) -> Self {
        AutoTradeDecision {
            triggered: true,
            confidence,
            threshold,
            rejection: None,
            reason: "all predicates satisfied".to_string(),
        }
    }

    pub fn rejected(confidence: f64, threshold: f64, why: RejectReason) -> Self {
        let reason = why.to_string();
        AutoTradeDecision {
            triggered: false,
            confidence,
            threshold,
            rejection: Some(why),
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Orders and accounts
// ---------------------------------------------------------------------------

/// An execution-capable account context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Order request handed to the execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: f64,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, qty: f64) -> Self {
        OrderRequest {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            qty,
            price: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Accepted,
    Filled,
    Rejected,
}

/// Acknowledgement returned by the execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: String,
    pub status: OrderStatus,
    /// Fill price when known (paper venue always fills at the mark).
    pub fill_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
}

/// Answer from the pre-trade risk gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl RiskAssessment {
    pub fn allowed() -> Self {
        RiskAssessment {
            allowed: true,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        RiskAssessment {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Run results and telemetry
// ---------------------------------------------------------------------------

/// What happened after the gate said TRIGGERED.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ExecutionOutcome {
    Placed {
        account_id: String,
        order_id: String,
        qty: f64,
        price: f64,
    },
    RiskBlocked {
        account_id: String,
        reason: String,
    },
    /// Order placement threw; caught and logged, run still completes.
    Failed {
        error: String,
    },
    /// No account had enough balance to fund the minimum position.
    NoFundedAccount,
}

/// Ephemeral per-tick value tying a symbol to a research answer plus the
/// gate decision (and, when triggered, the execution outcome).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub cadence_mins: u64,
    pub symbol: String,
    pub account_id: String,
    pub verdict: ResearchVerdict,
    pub decision: AutoTradeDecision,
    pub execution: Option<ExecutionOutcome>,
    pub completed_at: DateTime<Utc>,
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}m] {} {} conf={:.1} triggered={}",
            self.cadence_mins,
            self.symbol,
            self.verdict.side,
            self.verdict.confidence,
            self.decision.triggered,
        )
    }
}

/// One durable record: rotation cursor plus last-run telemetry.
///
/// All fields are absent before the first successful run. The invariant
/// `last_processed_index ∈ [0, universe_size)` is maintained by the
/// verified write-then-read protocol in `coordinator::rotation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    #[serde(default)]
    pub last_processed_index: Option<usize>,
    #[serde(default)]
    pub last_run_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_symbol: Option<String>,
    #[serde(default)]
    pub last_duration_ms: Option<u64>,
    #[serde(default)]
    pub last_success: Option<bool>,
}

/// Kind of execution-log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionKind {
    Entry,
    TakeProfitClose,
}

/// Durable record of one order actually placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub account_id: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub order_id: String,
    pub kind: ExecutionKind,
    #[serde(default)]
    pub note: String,
}

impl ExecutionLogEntry {
    pub fn new(
        symbol: &str,
        account_id: &str,
        side: Side,
        qty: f64,
        price: f64,
        order_id: &str,
        kind: ExecutionKind,
    ) -> Self {
        ExecutionLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            account_id: account_id.to_string(),
            side,
            qty,
            price,
            order_id: order_id.to_string(),
            kind,
            note: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Coordination errors that are fatal to a run.
///
/// Everything else (per-account research failures, risk rejections, order
/// failures, notification errors) is isolated or swallowed per the error
/// taxonomy — only these abort a tick.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// An empty universe signals a provider outage that must not be
    /// silently masked by a hardcoded fallback symbol.
    #[error("universe provider returned an empty symbol list")]
    EmptyUniverse,

    #[error("rotation cursor verification failed: wrote {wrote}, read back {read_back}")]
    CursorVerification { wrote: usize, read_back: String },

    #[error("all {attempted} account contexts failed for {symbol}")]
    AllAccountsFailed { symbol: String, attempted: usize },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
