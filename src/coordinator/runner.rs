//! Run orchestration: cadence timers, the per-tick state machine
//! (IDLE → ACQUIRING → RUNNING → IDLE), per-symbol pipeline, trade
//! execution, and TP-watcher supervision.
//!
//! Two independent guards must both pass before a run starts: the
//! process-local reentrancy lock (no two runs overlap within one
//! process, across *any* cadence) and the cadence lease (no two
//! processes run the same cadence concurrently). A held lease is an
//! expected outcome and skips the tick silently.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, RunMode, SchedulerConfig};
use crate::coordinator::gate::{evaluate_gate, suppress_duplicates, DuplicateWindow};
use crate::coordinator::lease::LeaseManager;
use crate::coordinator::rotation::{merge_universe, RotationCursor};
use crate::coordinator::watcher::{TakeProfitWatcher, WatcherHandle};
use crate::notify::{notify_best_effort, Notifier};
use crate::providers::{ExecutionService, ResearchService, RiskGate, UniverseProvider};
use crate::stores::{LockStore, StateStore};
use crate::types::{
    AutoTradeDecision, CoordinationError, ExecutionKind, ExecutionLogEntry, ExecutionOutcome,
    OrderRequest, ResearchVerdict, RunResult,
};

/// State Store id of the shared scheduler config record.
pub const SCHEDULER_CONFIG_ID: &str = "scheduler:config";

/// State Store id of the tracked-symbol list (derived from prior user
/// activity, seeded at startup).
pub const TRACKED_SYMBOLS_ID: &str = "scheduler:tracked";

/// Seconds between staggered startup lease attempts per cadence.
const STARTUP_STAGGER_SECS: u64 = 10;

/// Outcome of one tick attempt.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Box<RunResult>),
    Failed(String),
    /// Another run is in flight in this process.
    SkippedBusy,
    /// Another process holds the cadence lease.
    SkippedLeaseHeld,
}

struct CoordinatorInner {
    boot: AppConfig,
    lease: LeaseManager,
    state: Arc<dyn StateStore>,
    cursor: RotationCursor,
    universe: Arc<dyn UniverseProvider>,
    research: Arc<dyn ResearchService>,
    risk: Arc<dyn RiskGate>,
    exec: Arc<dyn ExecutionService>,
    notifier: Option<Arc<dyn Notifier>>,
    /// Reentrancy guard: serializes all runs within this process.
    run_guard: tokio::sync::Mutex<()>,
    duplicates: Mutex<DuplicateWindow>,
    watchers: Mutex<Vec<WatcherHandle>>,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

/// Handle to the cadence timer tasks. `stop` cancels future ticks only:
/// in-flight runs and TP watchers run to natural completion, and held
/// leases expire passively.
pub struct CoordinatorHandle {
    timers: Vec<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub fn stop(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        info!("Coordinator timers cancelled");
    }
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        boot: AppConfig,
        locks: Arc<dyn LockStore>,
        state: Arc<dyn StateStore>,
        universe: Arc<dyn UniverseProvider>,
        research: Arc<dyn ResearchService>,
        risk: Arc<dyn RiskGate>,
        exec: Arc<dyn ExecutionService>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let owner_id = crate::coordinator::lease::process_owner_id();
        let duplicate_window_mins = boot.scheduler.duplicate_window_mins;
        Coordinator {
            inner: Arc::new(CoordinatorInner {
                boot,
                lease: LeaseManager::new(locks, owner_id),
                cursor: RotationCursor::new(state.clone()),
                state,
                universe,
                research,
                risk,
                exec,
                notifier,
                run_guard: tokio::sync::Mutex::new(()),
                duplicates: Mutex::new(DuplicateWindow::new(duplicate_window_mins)),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn owner_id(&self) -> &str {
        self.inner.lease.owner_id()
    }

    /// Live scheduler config: the State Store copy when present and
    /// parseable, otherwise the boot default. Always normalized.
    pub async fn scheduler_config(&self) -> SchedulerConfig {
        match self.inner.state.get(SCHEDULER_CONFIG_ID).await {
            Ok(Some(value)) => match serde_json::from_value::<SchedulerConfig>(value) {
                Ok(cfg) => cfg.normalize(),
                Err(e) => {
                    warn!(error = %e, "Stored scheduler config unreadable, using boot config");
                    self.inner.boot.scheduler.clone()
                }
            },
            Ok(None) => self.inner.boot.scheduler.clone(),
            Err(e) => {
                warn!(error = %e, "State store unavailable for config read, using boot config");
                self.inner.boot.scheduler.clone()
            }
        }
    }

    // -- Lifecycle --------------------------------------------------------

    /// Spawn one repeating timer per configured cadence, each preceded
    /// by a staggered startup lease attempt so a freshly started
    /// instance claims idle cadences immediately instead of waiting a
    /// full interval.
    pub fn start(&self) -> CoordinatorHandle {
        let cadences = self.inner.boot.scheduler.cadences_mins.clone();
        let mut timers = Vec::new();

        for (i, cadence_mins) in cadences.iter().copied().enumerate() {
            let coordinator = self.clone();
            let startup_offset = Duration::from_secs(STARTUP_STAGGER_SECS * (i as u64 + 1));
            timers.push(tokio::spawn(async move {
                tokio::time::sleep(startup_offset).await;
                // Ticks run as their own tasks so cancelling the timer
                // never cancels an in-flight run.
                let c = coordinator.clone();
                tokio::spawn(async move {
                    c.tick(cadence_mins).await;
                });

                let period = Duration::from_secs(cadence_mins * 60);
                let mut ticks = interval_at(Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    let c = coordinator.clone();
                    tokio::spawn(async move {
                        c.tick(cadence_mins).await;
                    });
                }
            }));
        }

        info!(
            cadences = ?self.inner.boot.scheduler.cadences_mins,
            owner = %self.owner_id(),
            "Coordinator started"
        );
        CoordinatorHandle { timers }
    }

    /// Number of TP watchers still running (finished handles pruned).
    pub fn active_watchers(&self) -> usize {
        let mut watchers = self.inner.watchers.lock().unwrap();
        watchers.retain(|w| !w.is_finished());
        watchers.len()
    }

    // -- One tick ---------------------------------------------------------

    /// Attempt one evaluation cycle for a cadence.
    pub async fn tick(&self, cadence_mins: u64) -> RunOutcome {
        // Guard 1: process-local reentrancy.
        let _guard = match self.inner.run_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(cadence_mins, "Run already in flight, tick skipped");
                return RunOutcome::SkippedBusy;
            }
        };

        let cfg = self.scheduler_config().await;

        // Guard 2: cadence lease across processes.
        match self
            .inner
            .lease
            .acquire(cadence_mins, cfg.lease_ttl_ms(), false)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(cadence_mins, "Cadence lease held elsewhere, tick skipped");
                return RunOutcome::SkippedLeaseHeld;
            }
            Err(e) => {
                warn!(cadence_mins, error = %e, "Lease acquire errored, tick skipped");
                return RunOutcome::Failed(e.to_string());
            }
        }

        let started_at = Utc::now();
        let t0 = Instant::now();
        let run = self.process_coins(cadence_mins, &cfg).await;
        let duration_ms = t0.elapsed().as_millis() as u64;

        // Telemetry is best-effort; a persistence failure never fails
        // the run or blocks the lease release below.
        let symbol = run.as_ref().ok().map(|r| r.symbol.clone());
        if let Err(e) = self
            .inner
            .cursor
            .record_run(started_at, symbol.as_deref(), duration_ms, run.is_ok())
            .await
        {
            warn!(error = %e, "Failed to persist run telemetry (ignored)");
        }

        // Release in all paths so a mid-run failure never leaves the
        // lease held past its natural expiry.
        if let Err(e) = self.inner.lease.release(cadence_mins).await {
            warn!(error = %e, "Lease release failed (lease will expire passively)");
        }

        self.active_watchers(); // prune finished handles

        match run {
            Ok(result) => {
                info!(%result, duration_ms, "Run complete");
                RunOutcome::Completed(Box::new(result))
            }
            Err(e) => {
                error!(cadence_mins, duration_ms, error = %e, "Run failed");
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    // -- Universe + rotation ----------------------------------------------

    async fn resolve_universe(&self, cfg: &SchedulerConfig) -> Result<Vec<String>> {
        let top = self.inner.universe.top_symbols(cfg.top_n).await?;
        // An empty provider list signals an outage; no hardcoded
        // fallback symbol is allowed to mask it.
        if top.is_empty() {
            return Err(CoordinationError::EmptyUniverse.into());
        }

        let tracked = match self.inner.state.get(TRACKED_SYMBOLS_ID).await {
            Ok(Some(value)) => serde_json::from_value::<Vec<String>>(value).unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok(merge_universe(top, tracked))
    }

    async fn process_coins(&self, cadence_mins: u64, cfg: &SchedulerConfig) -> Result<RunResult> {
        let universe = self.resolve_universe(cfg).await?;
        debug!(size = universe.len(), mode = ?cfg.mode, "Universe resolved");

        match cfg.mode {
            RunMode::Rotate => {
                // Cursor is advanced and verified *before* processing.
                let index = self.inner.cursor.advance(universe.len()).await?;
                let symbol = universe[index].clone();
                info!(index, symbol = %symbol, cadence_mins, "Rotation selected symbol");
                self.process_symbol(&symbol, cadence_mins, cfg).await
            }
            RunMode::Bulk => {
                let mut first: Option<RunResult> = None;
                for symbol in &universe {
                    match self.process_symbol(symbol, cadence_mins, cfg).await {
                        Ok(result) => {
                            if first.is_none() {
                                first = Some(result);
                            }
                        }
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "Bulk symbol failed, continuing");
                        }
                    }
                }
                first.ok_or_else(|| anyhow!("bulk run: no symbol succeeded"))
            }
        }
    }

    // -- Per-symbol pipeline ----------------------------------------------

    async fn process_symbol(
        &self,
        symbol: &str,
        cadence_mins: u64,
        cfg: &SchedulerConfig,
    ) -> Result<RunResult> {
        let deadline = Duration::from_secs(cfg.research_timeout_secs);
        let accounts = &self.inner.boot.accounts;
        let mut first: Option<RunResult> = None;

        for account in accounts {
            // Hard deadline as a race; a timeout is a per-account
            // failure, not a run failure.
            let verdict = match timeout(deadline, self.inner.research.run(symbol, account)).await
            {
                Err(_) => {
                    warn!(symbol, account = %account.id, "Research call timed out");
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(symbol, account = %account.id, error = %e, "Research call failed");
                    continue;
                }
                Ok(Ok(verdict)) => verdict,
            };

            let mut decision = evaluate_gate(cfg, &verdict);
            let mut execution = None;
            if decision.triggered {
                let (d, ex) = self.execute_trade(symbol, &verdict, decision, cfg).await;
                decision = d;
                execution = ex;
            }

            let result = RunResult {
                cadence_mins,
                symbol: symbol.to_string(),
                account_id: account.id.clone(),
                verdict,
                decision,
                execution,
                completed_at: Utc::now(),
            };
            self.persist_result(&result).await;

            if first.is_none() {
                first = Some(result);
            }
        }

        first.ok_or_else(|| {
            CoordinationError::AllAccountsFailed {
                symbol: symbol.to_string(),
                attempted: accounts.len(),
            }
            .into()
        })
    }

    /// Persist one (symbol, account) result. Failures are logged and
    /// swallowed — result telemetry never fails a run.
    async fn persist_result(&self, result: &RunResult) {
        let id = format!("result:{}:{}", result.symbol, result.account_id);
        let value = serde_json::to_value(result).unwrap_or_default();
        if let Err(e) = self.inner.state.set(&id, value, false).await {
            warn!(id, error = %e, "Failed to persist run result (ignored)");
        }
    }

    // -- Trade execution --------------------------------------------------

    /// Execute a TRIGGERED decision: duplicate suppression, funded
    /// account selection, sizing, risk gate, order placement, logging,
    /// notification, and TP watcher spawn.
    ///
    /// Returns the (possibly downgraded) decision plus the execution
    /// outcome. Nothing in here fails the run.
    async fn execute_trade(
        &self,
        symbol: &str,
        verdict: &ResearchVerdict,
        decision: AutoTradeDecision,
        cfg: &SchedulerConfig,
    ) -> (AutoTradeDecision, Option<ExecutionOutcome>) {
        let decision = {
            let mut window = self.inner.duplicates.lock().unwrap();
            suppress_duplicates(&mut window, symbol, decision)
        };
        if !decision.triggered {
            return (decision, None);
        }

        // First account with a positive balance funds the trade.
        let mut funded: Option<(String, f64)> = None;
        for account in &self.inner.boot.accounts {
            match self.inner.exec.account(&account.id).await {
                Ok(snap) if snap.balance > 0.0 => {
                    funded = Some((account.id.clone(), snap.balance));
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(account = %account.id, error = %e, "Account query failed");
                    continue;
                }
            }
        }
        let Some((account_id, balance)) = funded else {
            warn!(symbol, "No funded account available for auto-trade");
            return (decision, Some(ExecutionOutcome::NoFundedAccount));
        };

        let entry = match verdict.entry {
            Some(price) if price > 0.0 => price,
            _ => match self.inner.exec.ticker(symbol).await {
                Ok(t) => t.price,
                Err(e) => {
                    error!(symbol, error = %e, "Ticker query failed, trade abandoned");
                    return (
                        decision,
                        Some(ExecutionOutcome::Failed {
                            error: format!("ticker: {e}"),
                        }),
                    );
                }
            },
        };

        // Fixed fraction of balance over entry price, floored at the
        // configured minimum.
        let qty = ((balance * cfg.position_fraction) / entry).max(cfg.min_order_qty);

        // Risk gate: rejection aborts execution but not the run.
        match self
            .inner
            .risk
            .can_trade(
                &account_id,
                symbol,
                qty,
                entry,
                cfg.assumed_adverse_move_pct,
            )
            .await
        {
            Ok(assessment) if !assessment.allowed => {
                let reason = assessment
                    .reason
                    .unwrap_or_else(|| "risk gate rejected".to_string());
                info!(symbol, account = %account_id, %reason, "Trade blocked by risk gate");
                return (
                    decision,
                    Some(ExecutionOutcome::RiskBlocked { account_id, reason }),
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(symbol, error = %e, "Risk gate errored, trade abandoned");
                return (
                    decision,
                    Some(ExecutionOutcome::Failed {
                        error: format!("risk gate: {e}"),
                    }),
                );
            }
        }

        let order = OrderRequest::market(symbol, verdict.side, qty);
        let ack = match self.inner.exec.place_order(&account_id, &order).await {
            Ok(ack) => ack,
            Err(e) => {
                error!(symbol, account = %account_id, error = %e, "Order placement failed");
                return (
                    decision,
                    Some(ExecutionOutcome::Failed {
                        error: e.to_string(),
                    }),
                );
            }
        };

        self.inner.duplicates.lock().unwrap().record(symbol);

        let price = ack.fill_price.unwrap_or(entry);
        let log = ExecutionLogEntry::new(
            symbol,
            &account_id,
            verdict.side,
            qty,
            price,
            &ack.id,
            ExecutionKind::Entry,
        );
        if let Err(e) = self
            .inner
            .state
            .set(
                &format!("execlog:{}", log.id),
                serde_json::to_value(&log).unwrap_or_default(),
                false,
            )
            .await
        {
            warn!(error = %e, "Failed to persist execution log entry (ignored)");
        }

        notify_best_effort(
            self.inner.notifier.clone(),
            format!(
                "ROTOR entry: {symbol} {} qty {qty:.6} @ {price:.2} (confidence {:.1})",
                verdict.side, decision.confidence
            ),
        );

        if let Some(target) = verdict.take_profit {
            let watcher = TakeProfitWatcher {
                symbol: symbol.to_string(),
                account_id: account_id.clone(),
                entry_order_id: ack.id.clone(),
                side: verdict.side,
                qty,
                target,
                poll: Duration::from_secs(cfg.tp_poll_secs),
                max_lifetime: Duration::from_secs(cfg.tp_max_hours * 3600),
                exec: self.inner.exec.clone(),
                state: self.inner.state.clone(),
            };
            let handle = watcher.spawn();
            info!(symbol, target, entry_order = %handle.entry_order_id, "TP watcher spawned");
            self.inner.watchers.lock().unwrap().push(handle);
        }

        (
            decision,
            Some(ExecutionOutcome::Placed {
                account_id,
                order_id: ack.id,
                qty,
                price,
            }),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
