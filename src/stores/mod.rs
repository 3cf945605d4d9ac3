//! Lock Store and State Store contracts.
//!
//! These are the only channels through which cross-process truth flows.
//! The coordinator never trusts process memory as shared state: the
//! rotation cursor and the scheduler config live behind `StateStore`,
//! and cadence ownership lives behind `LockStore`.
//!
//! The lock protocol is optimistic, TTL-bounded exclusion — not
//! consensus. Correctness assumes TTL ≫ (max clock skew + max run
//! duration); callers must tolerate rare double-execution.

pub mod file;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use file::FileStateStore;
pub use memory::{MemoryLockStore, MemoryStateStore};

// ---------------------------------------------------------------------------
// Lease records
// ---------------------------------------------------------------------------

/// A time-bounded mutual-exclusion record electing one active runner
/// for a cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub key: String,
    pub owner_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub forced: bool,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Read-only view of a lease for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseStatus {
    pub held: bool,
    pub owner_id: String,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Lease-based mutual exclusion keyed by cadence.
///
/// `acquire` semantics: read the current lease; if present, unexpired,
/// and `force` is false, the call fails (returns `false` — an expected
/// outcome, not an error). An expired lease is deleted before the new
/// one is written. `release` deletes the lease only when `owner_id`
/// matches; a process must never delete a lease it does not own.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn acquire(&self, key: &str, ttl_ms: i64, owner_id: &str, force: bool)
        -> Result<bool>;

    async fn release(&self, key: &str, owner_id: &str) -> Result<()>;

    async fn status(&self, key: &str) -> Result<Option<LeaseStatus>>;
}

/// Durable document store with read-after-write visibility.
///
/// Documents are JSON values keyed by id. `merge = true` performs a
/// shallow object merge of the update into the existing document;
/// `merge = false` overwrites in full. Read-after-write visibility is
/// required for the rotation cursor's verification step.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>>;

    async fn set(&self, id: &str, update: serde_json::Value, merge: bool) -> Result<()>;
}

/// Shallow object merge: keys of `update` replace keys of `base`.
/// Non-object inputs are replaced wholesale.
pub(crate) fn merge_documents(
    base: Option<serde_json::Value>,
    update: serde_json::Value,
) -> serde_json::Value {
    match (base, update) {
        (Some(serde_json::Value::Object(mut b)), serde_json::Value::Object(u)) => {
            for (k, v) in u {
                b.insert(k, v);
            }
            serde_json::Value::Object(b)
        }
        (_, update) => update,
    }
}
