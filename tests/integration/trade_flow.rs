//! Gate, execution, duplicate suppression, and TP watcher flows.

use std::time::Duration;

use rotor::config::RunMode;
use rotor::coordinator::runner::RunOutcome;
use rotor::stores::StateStore;
use rotor::types::Side;

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
async fn test_high_confidence_entry_and_tp_close() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(90.0, Side::Long)));

    let mut scheduler = scheduler_defaults();
    scheduler.tp_poll_secs = 1;
    let rig = Rig::new(app_config(&["acct-1"], scheduler), universe, research);

    let result = completed(rig.coordinator.tick(5).await);
    assert!(result.decision.triggered);

    let fills = rig.exec.fills();
    assert_eq!(fills.len(), 1, "exactly one entry order");
    assert_eq!(fills[0].order.side, Side::Long);
    assert_eq!(rig.coordinator.active_watchers(), 1);

    // Price crosses the 53k take-profit target; the watcher closes the
    // position within one poll.
    rig.exec.set_price("BTCUSDT", 53_500.0);
    tokio::time::sleep(Duration::from_millis(1_400)).await;

    let fills = rig.exec.fills();
    assert_eq!(fills.len(), 2, "exactly one closing order");
    assert_eq!(fills[1].order.side, Side::Short);
    assert_eq!(rig.coordinator.active_watchers(), 0);
}

#[tokio::test]
async fn test_duplicate_window_allows_one_entry() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(90.0, Side::Long)));
    let rig = Rig::new(app_config(&["acct-1"], scheduler_defaults()), universe, research);

    completed(rig.coordinator.tick(5).await);
    let second = completed(rig.coordinator.tick(5).await);

    assert!(!second.decision.triggered);
    assert!(second.decision.reason.contains("duplicate"));
    assert_eq!(rig.exec.fills().len(), 1, "second entry suppressed");
}

#[tokio::test]
async fn test_below_threshold_never_reaches_execution() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(74.9, Side::Long)));
    let rig = Rig::new(app_config(&["acct-1"], scheduler_defaults()), universe, research);

    let result = completed(rig.coordinator.tick(5).await);
    assert!(!result.decision.triggered);
    assert!(result.decision.reason.contains("threshold"));
    assert!(rig.exec.fills().is_empty());
}

#[tokio::test]
async fn test_auto_trade_disabled_blocks_everything() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(99.0, Side::Long)));

    let mut scheduler = scheduler_defaults();
    scheduler.auto_trade_enabled = false;
    let rig = Rig::new(app_config(&["acct-1"], scheduler), universe, research);

    let result = completed(rig.coordinator.tick(5).await);
    assert!(!result.decision.triggered);
    assert!(result.decision.reason.contains("disabled"));
    assert!(rig.exec.fills().is_empty());
}

#[tokio::test]
async fn test_risk_gate_blocks_trade_but_run_completes() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(90.0, Side::Long)));

    // Risk budget of 0.1% of balance: the default 5% position with a 5%
    // assumed adverse move cannot fit.
    let mut cfg = app_config(&["acct-1"], scheduler_defaults());
    cfg.execution.max_risk_fraction = 0.001;
    let rig = Rig::new(cfg, universe, research);

    let result = completed(rig.coordinator.tick(5).await);
    assert!(result.decision.triggered, "the gate itself still triggers");
    assert!(rig.exec.fills().is_empty(), "but no order is placed");

    // The persisted result carries the risk-blocked outcome.
    let doc = rig
        .state
        .get("result:BTCUSDT:acct-1")
        .await
        .unwrap()
        .expect("result persisted per (symbol, account)");
    assert_eq!(doc["execution"]["outcome"], "risk-blocked");
}

#[tokio::test]
async fn test_neutral_verdict_is_rejected_not_traded() {
    let universe = ScriptedUniverse::new(&["BTCUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(90.0, Side::Neutral)));
    let rig = Rig::new(app_config(&["acct-1"], scheduler_defaults()), universe, research);

    let result = completed(rig.coordinator.tick(5).await);
    assert!(!result.decision.triggered);
    assert!(result.decision.reason.contains("NEUTRAL"));
    assert!(rig.exec.fills().is_empty());
}

#[tokio::test]
async fn test_bulk_mode_survives_failing_symbols() {
    let universe = ScriptedUniverse::new(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    let research = ScriptedResearch::new(ResearchScript::Answer(verdict(50.0, Side::Long)));
    research.script("ETHUSDT", ResearchScript::Fail);

    let mut scheduler = scheduler_defaults();
    scheduler.mode = RunMode::Bulk;
    let rig = Rig::new(app_config(&["acct-1"], scheduler), universe, research);

    completed(rig.coordinator.tick(5).await);

    // Results persisted for the healthy symbols, nothing for the failed one.
    assert!(rig
        .state
        .get("result:BTCUSDT:acct-1")
        .await
        .unwrap()
        .is_some());
    assert!(rig
        .state
        .get("result:SOLUSDT:acct-1")
        .await
        .unwrap()
        .is_some());
    assert!(rig
        .state
        .get("result:ETHUSDT:acct-1")
        .await
        .unwrap()
        .is_none());
}
