//! The auto-trade decision gate.
//!
//! A candidate verdict is TRIGGERED only when every predicate passes,
//! evaluated in a fixed order so the *first* failure determines the
//! reported reason. The confidence threshold is clamped at config-write
//! time, never here — the gate trusts its inputs.
//!
//! Duplicate suppression is a separate, post-gate check: a TRIGGERED
//! decision is forced to REJECTED when the same symbol traded within
//! the suppression window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::types::{AutoTradeDecision, RejectReason, ResearchStatus, ResearchVerdict, Side};

// ---------------------------------------------------------------------------
// Predicate chain
// ---------------------------------------------------------------------------

/// Evaluate the ordered predicate chain for one research verdict.
pub fn evaluate_gate(cfg: &SchedulerConfig, verdict: &ResearchVerdict) -> AutoTradeDecision {
    let confidence = verdict.confidence;
    let threshold = cfg.auto_trade_threshold;

    let reject = |why: RejectReason| AutoTradeDecision::rejected(confidence, threshold, why);

    // 1. Master switch.
    if !cfg.auto_trade_enabled {
        return reject(RejectReason::AutoTradeDisabled);
    }

    // 2. Research must have had enough data.
    if verdict.status != ResearchStatus::SufficientData {
        return reject(RejectReason::InsufficientData);
    }

    // 3. Confidence threshold.
    if confidence < threshold {
        return reject(RejectReason::BelowThreshold {
            confidence,
            threshold,
        });
    }

    // 4. A direction to trade in.
    if verdict.side == Side::Neutral {
        return reject(RejectReason::NeutralSide);
    }

    // 5. Confluence: enough agreeing majors, or the relaxed minor count.
    let c = verdict.confluence;
    let confluence_ok = c.major_agreeing >= cfg.min_major_confluence
        || c.minor_agreeing >= cfg.relaxed_minor_confluence;
    if !confluence_ok {
        return reject(RejectReason::NoConfluence {
            major: c.major_agreeing,
            minor: c.minor_agreeing,
        });
    }

    // 6. Volume confirmation, when the config demands it.
    if cfg.require_volume_confirmation && !verdict.volume_confirmed {
        return reject(RejectReason::VolumeUnconfirmed);
    }

    // 7. Derivatives veto.
    if verdict.derivatives_contradict {
        return reject(RejectReason::DerivativesVeto);
    }

    debug!(confidence, threshold, side = %verdict.side, "Gate TRIGGERED");
    AutoTradeDecision::triggered(confidence, threshold)
}

// ---------------------------------------------------------------------------
// Duplicate suppression
// ---------------------------------------------------------------------------

/// In-process map of symbol → last trade time. Entries older than twice
/// the suppression window are dropped on each touch.
pub struct DuplicateWindow {
    window: Duration,
    last_trade: HashMap<String, DateTime<Utc>>,
}

impl DuplicateWindow {
    pub fn new(window_mins: i64) -> Self {
        DuplicateWindow {
            window: Duration::minutes(window_mins),
            last_trade: HashMap::new(),
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = self.window * 2;
        self.last_trade.retain(|_, at| now - *at <= horizon);
    }

    /// Minutes since the last trade of `symbol`, when inside the window.
    pub fn recent_trade(&mut self, symbol: &str) -> Option<i64> {
        let now = Utc::now();
        self.prune(now);
        match self.last_trade.get(symbol) {
            Some(at) if now - *at <= self.window => Some((now - *at).num_minutes()),
            _ => None,
        }
    }

    /// Record a trade for `symbol` at now.
    pub fn record(&mut self, symbol: &str) {
        self.last_trade.insert(symbol.to_string(), Utc::now());
    }

    #[cfg(test)]
    fn record_at(&mut self, symbol: &str, at: DateTime<Utc>) {
        self.last_trade.insert(symbol.to_string(), at);
    }
}

/// Force a TRIGGERED decision to REJECTED when the symbol traded within
/// the suppression window. Non-TRIGGERED decisions pass through.
pub fn suppress_duplicates(
    window: &mut DuplicateWindow,
    symbol: &str,
    decision: AutoTradeDecision,
) -> AutoTradeDecision {
    if !decision.triggered {
        return decision;
    }
    match window.recent_trade(symbol) {
        Some(minutes_since_last) => {
            debug!(symbol, minutes_since_last, "Duplicate trade suppressed");
            AutoTradeDecision::rejected(
                decision.confidence,
                decision.threshold,
                RejectReason::DuplicateTrade { minutes_since_last },
            )
        }
        None => decision,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
