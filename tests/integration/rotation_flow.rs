//! Rotation, leases, and failure isolation through the full coordinator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use rotor::coordinator::runner::RunOutcome;
use rotor::coordinator::{Coordinator, ROTATION_STATE_ID};
use rotor::providers::{BasicRiskGate, PaperExchange};
use rotor::stores::{LockStore, MemoryLockStore, MemoryStateStore, StateStore};
use rotor::types::{RotationState, Side};

use crate::harness::{
    app_config, scheduler_defaults, verdict, ResearchScript, Rig, ScriptedResearch,
    ScriptedUniverse,
};

fn completed(outcome: RunOutcome) -> rotor::types::RunResult {
    match outcome {
        RunOutcome::Completed(result) => *result,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rotation_cycles_through_universe_without_skips() {
    let universe = ScriptedUniverse::new(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(50.0, Side::Long)));
    let rig = Rig::new(app_config(&["acct-1"], scheduler_defaults()), universe, research);

    let mut symbols = Vec::new();
    for _ in 0..4 {
        symbols.push(completed(rig.coordinator.tick(5).await).symbol);
    }
    assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "BTCUSDT"]);

    // The durable record reflects the last verified index.
    let raw = rig.state.get(ROTATION_STATE_ID).await.unwrap().unwrap();
    let record: RotationState = serde_json::from_value(raw).unwrap();
    assert_eq!(record.last_processed_index, Some(0));
    assert_eq!(record.last_symbol.as_deref(), Some("BTCUSDT"));
    assert_eq!(record.last_success, Some(true));
}

#[tokio::test]
async fn test_rotation_resumes_after_restart() {
    let universe = ScriptedUniverse::new(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(50.0, Side::Long)));
    let first = Rig::new(
        app_config(&["acct-1"], scheduler_defaults()),
        universe.clone(),
        research.clone(),
    );

    completed(first.coordinator.tick(5).await);
    completed(first.coordinator.tick(5).await);

    // New process instance, same state store, fresh locks.
    let restarted = Rig::with_stores(
        app_config(&["acct-1"], scheduler_defaults()),
        universe,
        research,
        Arc::new(MemoryLockStore::new()),
        first.state.clone(),
    );
    let result = completed(restarted.coordinator.tick(5).await);
    assert_eq!(result.symbol, "SOLUSDT");
}

#[tokio::test]
async fn test_two_instances_one_cadence_mutual_exclusion() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Slow(
        Duration::from_millis(200),
        verdict(50.0, Side::Long),
    ));

    let locks = Arc::new(MemoryLockStore::new());
    let state = Arc::new(MemoryStateStore::new());
    let a = Rig::with_stores(
        app_config(&["acct-1"], scheduler_defaults()),
        universe.clone(),
        research.clone(),
        locks.clone(),
        state.clone(),
    );
    let b = Rig::with_stores(
        app_config(&["acct-1"], scheduler_defaults()),
        universe,
        research,
        locks,
        state,
    );

    let first = tokio::spawn(async move { a.coordinator.tick(5).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Instance B finds the cadence lease held and skips silently.
    let second = b.coordinator.tick(5).await;
    assert!(matches!(second, RunOutcome::SkippedLeaseHeld));

    completed(first.await.unwrap());
}

#[tokio::test]
async fn test_failed_run_releases_lease() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Fail);
    let rig = Rig::new(app_config(&["acct-1"], scheduler_defaults()), universe, research);

    let outcome = rig.coordinator.tick(5).await;
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    // The cadence is immediately claimable again.
    assert!(rig
        .locks
        .acquire("scheduler:cadence:5m", 60_000, "other", false)
        .await
        .unwrap());

    // Telemetry recorded the failure.
    let raw = rig.state.get(ROTATION_STATE_ID).await.unwrap().unwrap();
    let record: RotationState = serde_json::from_value(raw).unwrap();
    assert_eq!(record.last_success, Some(false));
}

#[tokio::test]
async fn test_empty_universe_is_fatal() {
    let universe = ScriptedUniverse::new(&[]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(50.0, Side::Long)));
    let rig = Rig::new(app_config(&["acct-1"], scheduler_defaults()), universe, research);

    let RunOutcome::Failed(msg) = rig.coordinator.tick(5).await else {
        panic!("an empty universe must fail the run");
    };
    assert!(msg.contains("empty"));
}

#[tokio::test]
async fn test_per_account_research_failures_are_isolated() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(50.0, Side::Long)));
    research.fail_account("acct-1");

    let rig = Rig::new(
        app_config(&["acct-1", "acct-2"], scheduler_defaults()),
        universe,
        research,
    );
    let result = completed(rig.coordinator.tick(5).await);
    assert_eq!(result.account_id, "acct-2");
}

#[tokio::test]
async fn test_research_deadline_is_per_account_failure() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Slow(
        Duration::from_millis(1_500),
        verdict(50.0, Side::Long),
    ));

    let mut scheduler = scheduler_defaults();
    scheduler.research_timeout_secs = 1;
    let rig = Rig::new(app_config(&["acct-1"], scheduler), universe, research);

    // The only account times out, so the symbol (and run) fails, but the
    // lease is still released.
    let outcome = rig.coordinator.tick(5).await;
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(rig
        .locks
        .acquire("scheduler:cadence:5m", 60_000, "other", false)
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// Fail-closed rotation
// ---------------------------------------------------------------------------

/// State store whose rotation reads return a stale snapshot while
/// poisoned; writes always land in the real store.
struct PoisonableStore {
    inner: MemoryStateStore,
    lying: AtomicBool,
    stale: Mutex<Option<serde_json::Value>>,
}

#[async_trait]
impl StateStore for PoisonableStore {
    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>> {
        if id == ROTATION_STATE_ID && self.lying.load(Ordering::SeqCst) {
            return Ok(self.stale.lock().unwrap().clone());
        }
        self.inner.get(id).await
    }

    async fn set(&self, id: &str, update: serde_json::Value, merge: bool) -> Result<()> {
        self.inner.set(id, update, merge).await
    }
}

#[tokio::test]
async fn test_rotation_verification_failure_fails_closed() {
    let store = Arc::new(PoisonableStore {
        inner: MemoryStateStore::new(),
        lying: AtomicBool::new(false),
        stale: Mutex::new(None),
    });

    let cfg = app_config(&["acct-1"], scheduler_defaults());
    let universe = ScriptedUniverse::new(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(50.0, Side::Long)));
    let exec = Arc::new(PaperExchange::new(&["acct-1".to_string()], 10_000.0));
    exec.set_price("BTCUSDT", 50_000.0);
    let risk = Arc::new(BasicRiskGate::new(exec.clone(), 1.0));
    let locks = Arc::new(MemoryLockStore::new());

    let coordinator = Coordinator::new(
        cfg,
        locks.clone(),
        store.clone(),
        universe,
        research,
        risk,
        exec,
        None,
    );

    // Establish index 0 honestly, then make reads return the stale record.
    completed(coordinator.tick(5).await);
    *store.stale.lock().unwrap() =
        Some(serde_json::json!({ "last_processed_index": 0 }));
    store.lying.store(true, Ordering::SeqCst);

    let RunOutcome::Failed(msg) = coordinator.tick(5).await else {
        panic!("an unverifiable cursor write must fail the run");
    };
    assert!(msg.contains("verification"));

    // Lease was still released despite the mid-run failure.
    assert!(locks
        .acquire("scheduler:cadence:5m", 60_000, "other", false)
        .await
        .unwrap());
    locks.release("scheduler:cadence:5m", "other").await.unwrap();

    // The restore wrote the previous index back, so once reads are honest
    // the rotation continues from where it actually was.
    store.lying.store(false, Ordering::SeqCst);
    let result = completed(coordinator.tick(5).await);
    assert_eq!(result.symbol, "ETHUSDT");
}
