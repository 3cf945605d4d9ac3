//! The scheduling/coordination core.
//!
//! Owns cadence timers, the lease lifecycle, the rotation state machine,
//! per-symbol orchestration, the auto-trade decision gate, and TP-watcher
//! supervision. Everything else (scoring, market data, exchange wire
//! protocols, persistence engines) is consumed through the `stores` and
//! `providers` contracts.

pub mod gate;
pub mod lease;
pub mod retry;
pub mod rotation;
pub mod runner;
pub mod watcher;

pub use gate::{evaluate_gate, DuplicateWindow};
pub use lease::LeaseManager;
pub use retry::{retry, RetryClass, RetryPolicy};
pub use rotation::{merge_universe, RotationCursor, ROTATION_STATE_ID};
pub use runner::{Coordinator, CoordinatorHandle, RunOutcome, SCHEDULER_CONFIG_ID, TRACKED_SYMBOLS_ID};
pub use watcher::{TakeProfitWatcher, WatcherHandle, WatcherOutcome};
