//! File-backed State Store.
//!
//! Persists all documents into a single JSON file, rewritten in full on
//! every write. Read-after-write visibility comes for free because the
//! in-memory map is the source of truth and the file is only a durable
//! mirror. SQLite can replace this later for history queries; a flat
//! JSON document is sufficient for the cursor + telemetry records.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::{merge_documents, StateStore};

pub struct FileStateStore {
    path: String,
    docs: Mutex<BTreeMap<String, Value>>,
}

impl FileStateStore {
    /// Open (or create) the store at `path`, loading any existing
    /// documents from disk.
    pub fn open(path: &str) -> Result<Self> {
        let docs = if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read state file {path}"))?;
            let docs: BTreeMap<String, Value> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse state file {path}"))?;
            info!(path, documents = docs.len(), "State loaded from disk");
            docs
        } else {
            info!(path, "No saved state found, starting fresh");
            BTreeMap::new()
        };

        Ok(FileStateStore {
            path: path.to_string(),
            docs: Mutex::new(docs),
        })
    }

    fn flush(&self, docs: &BTreeMap<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(docs)
            .context("Failed to serialise state documents")?;
        std::fs::write(&self.path, &json)
            .with_context(|| format!("Failed to write state to {}", self.path))?;
        debug!(path = %self.path, documents = docs.len(), "State flushed");
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn set(&self, id: &str, update: Value, merge: bool) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let next = if merge {
            merge_documents(docs.get(id).cloned(), update)
        } else {
            update
        };
        docs.insert(id.to_string(), next);
        self.flush(&docs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
