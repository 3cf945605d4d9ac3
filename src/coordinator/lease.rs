//! Lease lifecycle over the Lock Store.
//!
//! Wraps the raw `LockStore` contract with the scheduler's conventions:
//! one key per cadence, a stable per-process owner id, and a TTL derived
//! from the longest configured cadence plus a margin. Leases are never
//! proactively released on shutdown — a crashed or stopped holder's
//! lease self-heals by passive expiry.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::stores::{LeaseStatus, LockStore};

/// Lock key for one cadence, shared by every process instance.
pub fn lease_key(cadence_mins: u64) -> String {
    format!("scheduler:cadence:{cadence_mins}m")
}

/// Owner id unique to this process instance: host, pid, and a random
/// suffix so respawns with a recycled pid still differ.
pub fn process_owner_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    let pid = std::process::id();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{host}-{pid}-{}", &suffix[..8])
}

pub struct LeaseManager {
    store: Arc<dyn LockStore>,
    owner_id: String,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn LockStore>, owner_id: String) -> Self {
        LeaseManager { store, owner_id }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Try to claim the cadence. `false` is the expected "someone else
    /// is running this cadence" outcome, not an error.
    pub async fn acquire(&self, cadence_mins: u64, ttl_ms: i64, force: bool) -> Result<bool> {
        let key = lease_key(cadence_mins);
        let acquired = self
            .store
            .acquire(&key, ttl_ms, &self.owner_id, force)
            .await?;
        debug!(key, acquired, ttl_ms, "Lease acquire attempt");
        Ok(acquired)
    }

    /// Release our lease for the cadence. A no-op if another owner holds
    /// it (a process must never delete a lease it does not own).
    pub async fn release(&self, cadence_mins: u64) -> Result<()> {
        self.store
            .release(&lease_key(cadence_mins), &self.owner_id)
            .await
    }

    pub async fn status(&self, cadence_mins: u64) -> Result<Option<LeaseStatus>> {
        self.store.status(&lease_key(cadence_mins)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
