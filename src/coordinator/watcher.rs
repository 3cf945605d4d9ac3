//! Take-profit watcher.
//!
//! One independent periodic task per (symbol, entry order): polls the
//! price on a short fixed interval up to a hard lifetime cap, places
//! exactly one opposite-side closing order when the target is crossed,
//! and self-terminates. The cap is a timeout outcome, not an error.
//! Per-tick fetch/order failures are logged and the watcher continues.
//!
//! Watchers are owned by their own handles — the coordinator's `stop()`
//! does not cancel them; they run to natural completion.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::providers::ExecutionService;
use crate::stores::StateStore;
use crate::types::{ExecutionKind, ExecutionLogEntry, OrderRequest, Side};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherOutcome {
    /// Target crossed; the closing order id is recorded.
    TargetHit { close_order_id: String },
    /// Lifetime cap reached without a crossing.
    TimedOut,
}

/// Handle to a spawned watcher, owned independently of the coordinator's
/// cadence timers.
pub struct WatcherHandle {
    pub symbol: String,
    pub entry_order_id: String,
    pub started_at: chrono::DateTime<Utc>,
    pub task: JoinHandle<WatcherOutcome>,
}

impl WatcherHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct TakeProfitWatcher {
    pub symbol: String,
    pub account_id: String,
    pub entry_order_id: String,
    /// Side of the *open position* (the close order is the opposite).
    pub side: Side,
    pub qty: f64,
    pub target: f64,
    pub poll: Duration,
    pub max_lifetime: Duration,
    pub exec: Arc<dyn ExecutionService>,
    pub state: Arc<dyn StateStore>,
}

impl TakeProfitWatcher {
    /// Target crossing per side: long closes at or above the target,
    /// short at or below.
    fn target_crossed(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price >= self.target,
            Side::Short => price <= self.target,
            Side::Neutral => false,
        }
    }

    pub fn spawn(self) -> WatcherHandle {
        let symbol = self.symbol.clone();
        let entry_order_id = self.entry_order_id.clone();
        WatcherHandle {
            symbol,
            entry_order_id,
            started_at: Utc::now(),
            task: tokio::spawn(self.run()),
        }
    }

    async fn run(self) -> WatcherOutcome {
        let deadline = Instant::now() + self.max_lifetime;
        let mut ticks = interval(self.poll);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval is immediate; consume it so
        // the first real check happens one poll after spawn.
        ticks.tick().await;

        info!(
            symbol = %self.symbol,
            entry_order = %self.entry_order_id,
            target = self.target,
            side = %self.side,
            "TP watcher started"
        );

        loop {
            ticks.tick().await;

            if Instant::now() >= deadline {
                info!(
                    symbol = %self.symbol,
                    entry_order = %self.entry_order_id,
                    "TP watcher hit lifetime cap, terminating"
                );
                return WatcherOutcome::TimedOut;
            }

            let price = match self.exec.ticker(&self.symbol).await {
                Ok(t) => t.price,
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "TP price fetch failed, retrying next tick");
                    continue;
                }
            };

            if !self.target_crossed(price) {
                continue;
            }

            let close = OrderRequest::market(&self.symbol, self.side.opposite(), self.qty);
            match self.exec.place_order(&self.account_id, &close).await {
                Ok(ack) => {
                    info!(
                        symbol = %self.symbol,
                        price,
                        target = self.target,
                        close_order = %ack.id,
                        "Take-profit target hit, position closed"
                    );
                    let entry = ExecutionLogEntry::new(
                        &self.symbol,
                        &self.account_id,
                        close.side,
                        self.qty,
                        ack.fill_price.unwrap_or(price),
                        &ack.id,
                        ExecutionKind::TakeProfitClose,
                    );
                    let id = format!("execlog:{}", entry.id);
                    if let Err(e) = self
                        .state
                        .set(&id, serde_json::to_value(&entry).unwrap_or_default(), false)
                        .await
                    {
                        warn!(error = %e, "Failed to persist TP close log entry (ignored)");
                    }
                    return WatcherOutcome::TargetHit {
                        close_order_id: ack.id,
                    };
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "TP close order failed, retrying next tick");
                    continue;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
