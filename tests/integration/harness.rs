//! Deterministic collaborators for integration testing.
//!
//! Provides scripted `UniverseProvider` and `ResearchService`
//! implementations plus a pre-wired coordinator rig — all in-memory
//! with no external dependencies. Execution goes through the real
//! `PaperExchange` and `BasicRiskGate` so the full trade path is
//! exercised.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rotor::config::{
    AgentConfig, AppConfig, DashboardConfig, ExecutionConfig, ResearchConfig, SchedulerConfig,
    StorageConfig, UniverseConfig,
};
use rotor::coordinator::Coordinator;
use rotor::providers::{BasicRiskGate, PaperExchange, ResearchService, UniverseProvider};
use rotor::stores::{MemoryLockStore, MemoryStateStore};
use rotor::types::{ConfluenceFlags, ResearchStatus, ResearchVerdict, Side};

/// A verdict that passes every gate predicate at the given confidence.
pub fn verdict(confidence: f64, side: Side) -> ResearchVerdict {
    ResearchVerdict {
        confidence,
        side,
        status: ResearchStatus::SufficientData,
        confluence: ConfluenceFlags {
            major_agreeing: 3,
            minor_agreeing: 4,
        },
        volume_confirmed: true,
        derivatives_contradict: false,
        entry: Some(50_000.0),
        stop_loss: Some(48_500.0),
        take_profit: Some(53_000.0),
        summary: "scripted verdict".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Scripted universe
// ---------------------------------------------------------------------------

pub struct ScriptedUniverse {
    symbols: Mutex<Vec<String>>,
}

impl ScriptedUniverse {
    pub fn new(symbols: &[&str]) -> Arc<Self> {
        Arc::new(ScriptedUniverse {
            symbols: Mutex::new(symbols.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl UniverseProvider for ScriptedUniverse {
    async fn top_symbols(&self, n: usize) -> Result<Vec<String>> {
        Ok(self
            .symbols
            .lock()
            .unwrap()
            .iter()
            .take(n)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scripted research
// ---------------------------------------------------------------------------

/// Per-symbol research behaviour.
#[derive(Clone)]
pub enum ResearchScript {
    Answer(ResearchVerdict),
    Fail,
    /// Answer after a delay (for deadline and overlap tests).
    Slow(Duration, ResearchVerdict),
}

pub struct ScriptedResearch {
    fallback: ResearchScript,
    per_symbol: Mutex<HashMap<String, ResearchScript>>,
    failing_accounts: Mutex<HashSet<String>>,
}

impl ScriptedResearch {
    pub fn new(fallback: ResearchScript) -> Arc<Self> {
        Arc::new(ScriptedResearch {
            fallback,
            per_symbol: Mutex::new(HashMap::new()),
            failing_accounts: Mutex::new(HashSet::new()),
        })
    }

    /// Override the behaviour for one symbol.
    pub fn script(&self, symbol: &str, script: ResearchScript) {
        self.per_symbol
            .lock()
            .unwrap()
            .insert(symbol.to_string(), script);
    }

    /// Make every call for this account fail.
    pub fn fail_account(&self, account_id: &str) {
        self.failing_accounts
            .lock()
            .unwrap()
            .insert(account_id.to_string());
    }
}

#[async_trait]
impl ResearchService for ScriptedResearch {
    async fn run(
        &self,
        symbol: &str,
        account: &rotor::types::AccountContext,
    ) -> Result<ResearchVerdict> {
        if self.failing_accounts.lock().unwrap().contains(&account.id) {
            return Err(anyhow!("scripted failure for account {}", account.id));
        }
        let script = self
            .per_symbol
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        match script {
            ResearchScript::Answer(v) => Ok(v),
            ResearchScript::Fail => Err(anyhow!("scripted failure for {symbol}")),
            ResearchScript::Slow(delay, v) => {
                tokio::time::sleep(delay).await;
                Ok(v)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator rig
// ---------------------------------------------------------------------------

pub fn scheduler_defaults() -> SchedulerConfig {
    SchedulerConfig {
        cadences_mins: vec![5],
        auto_trade_enabled: true,
        auto_trade_threshold: 75.0,
        ..SchedulerConfig::default()
    }
}

pub fn app_config(accounts: &[&str], scheduler: SchedulerConfig) -> AppConfig {
    AppConfig {
        agent: AgentConfig {
            name: "ROTOR-IT".to_string(),
        },
        scheduler,
        accounts: accounts
            .iter()
            .map(|id| rotor::types::AccountContext {
                id: id.to_string(),
                label: String::new(),
            })
            .collect(),
        universe: UniverseConfig {
            rest_endpoint: "http://localhost".to_string(),
            quote_asset: "USDT".to_string(),
            tracked: vec![],
        },
        research: ResearchConfig {
            endpoint: "http://localhost".to_string(),
            api_key_env: None,
        },
        execution: ExecutionConfig {
            paper_initial_balance: 10_000.0,
            max_risk_fraction: 1.0,
        },
        dashboard: DashboardConfig {
            enabled: false,
            port: 0,
        },
        alerts: Default::default(),
        storage: StorageConfig::default(),
    }
}

/// A coordinator wired to scripted collaborators with shared handles to
/// every backing store, for assertions from test code.
pub struct Rig {
    pub coordinator: Coordinator,
    pub locks: Arc<MemoryLockStore>,
    pub state: Arc<MemoryStateStore>,
    pub exec: Arc<PaperExchange>,
}

impl Rig {
    pub fn new(
        cfg: AppConfig,
        universe: Arc<ScriptedUniverse>,
        research: Arc<ScriptedResearch>,
    ) -> Self {
        Self::with_stores(
            cfg,
            universe,
            research,
            Arc::new(MemoryLockStore::new()),
            Arc::new(MemoryStateStore::new()),
        )
    }

    /// Build against existing stores — used to model a second process
    /// instance or a restart against persisted state.
    pub fn with_stores(
        cfg: AppConfig,
        universe: Arc<ScriptedUniverse>,
        research: Arc<ScriptedResearch>,
        locks: Arc<MemoryLockStore>,
        state: Arc<MemoryStateStore>,
    ) -> Self {
        let account_ids: Vec<String> = cfg.accounts.iter().map(|a| a.id.clone()).collect();
        let exec = Arc::new(PaperExchange::new(
            &account_ids,
            cfg.execution.paper_initial_balance,
        ));
        exec.set_price("BTCUSDT", 50_000.0);
        exec.set_price("ETHUSDT", 3_000.0);
        exec.set_price("SOLUSDT", 150.0);

        let risk = Arc::new(BasicRiskGate::new(
            exec.clone(),
            cfg.execution.max_risk_fraction,
        ));

        let coordinator = Coordinator::new(
            cfg,
            locks.clone(),
            state.clone(),
            universe,
            research,
            risk,
            exec.clone(),
            None,
        );
        Rig {
            coordinator,
            locks,
            state,
            exec,
        }
    }
}
