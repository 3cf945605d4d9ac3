//! Universe resolution and the crash-safe rotation cursor.
//!
//! The cursor advances `(last + 1) mod universe_size` and is written to
//! the State Store *before* any symbol processing, then read back to
//! verify. On mismatch the previous index is restored and the run fails
//! hard — a rotation pointer must never advance without confirmed
//! persistence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::stores::StateStore;
use crate::types::{CoordinationError, RotationState};

/// State Store id of the single rotation + telemetry record.
pub const ROTATION_STATE_ID: &str = "scheduler:rotation";

// ---------------------------------------------------------------------------
// Universe merge
// ---------------------------------------------------------------------------

/// Merge tracked symbols with the provider's top-N list.
///
/// Top-N entries keep their priority order; tracked-only symbols are
/// appended after them. Duplicates keep their first occurrence.
pub fn merge_universe(top_n: Vec<String>, tracked: Vec<String>) -> Vec<String> {
    let mut universe = top_n;
    for symbol in tracked {
        if !universe.contains(&symbol) {
            universe.push(symbol);
        }
    }
    universe
}

// ---------------------------------------------------------------------------
// Rotation cursor
// ---------------------------------------------------------------------------

pub struct RotationCursor {
    store: Arc<dyn StateStore>,
}

impl RotationCursor {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        RotationCursor { store }
    }

    /// Load the current rotation record (defaults before the first run).
    pub async fn load(&self) -> Result<RotationState> {
        match self.store.get(ROTATION_STATE_ID).await? {
            Some(value) => {
                serde_json::from_value(value).context("Corrupt rotation state record")
            }
            None => Ok(RotationState::default()),
        }
    }

    /// Advance the cursor for a universe of `universe_size` symbols and
    /// return the verified next index.
    ///
    /// Write-then-verify: the next index is persisted first, re-read to
    /// confirm, and only then may symbol processing begin. A failed
    /// verification restores the previous index and aborts the run.
    pub async fn advance(&self, universe_size: usize) -> Result<usize> {
        debug_assert!(universe_size > 0, "caller guards against empty universe");

        let previous = self.load().await?;
        let next = match previous.last_processed_index {
            Some(last) => (last + 1) % universe_size,
            None => 0,
        };

        self.store
            .set(
                ROTATION_STATE_ID,
                serde_json::json!({ "last_processed_index": next }),
                true,
            )
            .await
            .context("Failed to persist rotation index")?;

        // Verification read. Anything other than the index we just wrote
        // means the store is lying about durability — fail closed.
        let read_back = self
            .store
            .get(ROTATION_STATE_ID)
            .await?
            .and_then(|v| v.get("last_processed_index").cloned());

        let confirmed = matches!(
            read_back.as_ref().and_then(|v| v.as_u64()),
            Some(idx) if idx as usize == next
        );

        if !confirmed {
            error!(
                wrote = next,
                read_back = ?read_back,
                "Rotation verification failed, restoring previous index"
            );
            let restore = serde_json::json!({
                "last_processed_index": previous.last_processed_index,
            });
            self.store
                .set(ROTATION_STATE_ID, restore, true)
                .await
                .context("Failed to restore rotation index after verification failure")?;

            return Err(CoordinationError::CursorVerification {
                wrote: next,
                read_back: read_back
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "absent".to_string()),
            }
            .into());
        }

        debug!(index = next, universe_size, "Rotation cursor advanced");
        Ok(next)
    }

    /// Merge last-run telemetry into the rotation record. Persistence
    /// failures here are the caller's to swallow — telemetry must never
    /// fail a run.
    pub async fn record_run(
        &self,
        timestamp: DateTime<Utc>,
        symbol: Option<&str>,
        duration_ms: u64,
        success: bool,
    ) -> Result<()> {
        let mut update = serde_json::json!({
            "last_run_timestamp": timestamp,
            "last_duration_ms": duration_ms,
            "last_success": success,
        });
        if let Some(symbol) = symbol {
            update["last_symbol"] = serde_json::Value::String(symbol.to_string());
        }
        self.store.set(ROTATION_STATE_ID, update, true).await?;
        info!(
            symbol = symbol.unwrap_or("-"),
            duration_ms, success, "Run telemetry recorded"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
