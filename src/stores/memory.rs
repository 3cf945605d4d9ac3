//! In-process store implementations.
//!
//! `MemoryLockStore` carries the full lease protocol and is the default
//! lock backend for single-process deployments; it is also what the
//! integration tests race against. `MemoryStateStore` is the volatile
//! counterpart of `FileStateStore`, used in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::{merge_documents, Lease, LeaseStatus, LockStore, StateStore};

// ---------------------------------------------------------------------------
// Lock store
// ---------------------------------------------------------------------------

/// Lease table guarded by a plain mutex. The guard is never held across
/// an await point, so a std `Mutex` is sufficient.
#[derive(Default)]
pub struct MemoryLockStore {
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire(
        &self,
        key: &str,
        ttl_ms: i64,
        owner_id: &str,
        force: bool,
    ) -> Result<bool> {
        let now = Utc::now();
        let mut leases = self.leases.lock().unwrap();

        if let Some(existing) = leases.get(key) {
            if !existing.is_expired(now) && !force {
                debug!(
                    key,
                    holder = %existing.owner_id,
                    expires_at = %existing.expires_at,
                    "Lease held, acquire refused"
                );
                return Ok(false);
            }
            // Expired (or forced): delete, then proceed to write.
            leases.remove(key);
        }

        leases.insert(
            key.to_string(),
            Lease {
                key: key.to_string(),
                owner_id: owner_id.to_string(),
                acquired_at: now,
                expires_at: now + Duration::milliseconds(ttl_ms),
                forced: force,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, owner_id: &str) -> Result<()> {
        let mut leases = self.leases.lock().unwrap();
        match leases.get(key) {
            Some(lease) if lease.owner_id == owner_id => {
                leases.remove(key);
            }
            Some(lease) => {
                // Not ours — leave it to expire passively.
                debug!(key, holder = %lease.owner_id, caller = owner_id,
                    "Release skipped: lease owned by another process");
            }
            None => {}
        }
        Ok(())
    }

    async fn status(&self, key: &str) -> Result<Option<LeaseStatus>> {
        let leases = self.leases.lock().unwrap();
        Ok(leases.get(key).map(|l| LeaseStatus {
            held: !l.is_expired(Utc::now()),
            owner_id: l.owner_id.clone(),
            expires_at: l.expires_at,
        }))
    }
}

// ---------------------------------------------------------------------------
// State store
// ---------------------------------------------------------------------------

/// Volatile document store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStateStore {
    docs: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all stored documents, for assertions in tests.
    pub fn ids(&self) -> Vec<String> {
        self.docs.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn set(&self, id: &str, update: serde_json::Value, merge: bool) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let next = if merge {
            merge_documents(docs.get(id).cloned(), update)
        } else {
            update
        };
        docs.insert(id.to_string(), next);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
