//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.
//!
//! `SchedulerConfig` is special: it is the one record that is shared
//! *across processes* via the State Store. The copy in `config.toml` is
//! only the boot default; the admin surface overwrites the stored copy in
//! full. Validation and clamping happen here, at the boundary — never in
//! the coordinator's hot path.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::types::AccountContext;

/// The only tick periods the scheduler accepts, in minutes.
pub const ALLOWED_CADENCES: [u64; 5] = [5, 10, 15, 30, 60];

/// Bounds for the auto-trade confidence threshold.
pub const THRESHOLD_FLOOR: f64 = 75.0;
pub const THRESHOLD_CEIL: f64 = 100.0;

// ---------------------------------------------------------------------------
// Scheduler config (cross-process shared record)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// One symbol per tick, round-robin through the universe.
    Rotate,
    /// Whole universe per tick.
    Bulk,
}

/// Scheduler policy record. Mutated by full overwrite only; no history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub cadences_mins: Vec<u64>,
    pub mode: RunMode,
    pub top_n: usize,
    /// Confidence threshold for auto-trading, clamped to [75, 100]
    /// at write time.
    pub auto_trade_threshold: f64,
    pub auto_trade_enabled: bool,
    /// Minimum count of agreeing major signals for confluence.
    pub min_major_confluence: u32,
    /// Relaxed alternative: this many agreeing minor signals also passes.
    pub relaxed_minor_confluence: u32,
    pub require_volume_confirmation: bool,
    /// Same-symbol trades within this window are suppressed.
    pub duplicate_window_mins: i64,
    /// Fraction of available balance committed per entry.
    pub position_fraction: f64,
    pub min_order_qty: f64,
    /// Adverse move assumed by the pre-trade risk check, in percent.
    pub assumed_adverse_move_pct: f64,
    pub research_timeout_secs: u64,
    pub tp_poll_secs: u64,
    pub tp_max_hours: u64,
    /// Margin added to the longest cadence when computing lease TTL.
    pub lease_margin_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            cadences_mins: vec![15],
            mode: RunMode::Rotate,
            top_n: 10,
            auto_trade_threshold: 80.0,
            auto_trade_enabled: false,
            min_major_confluence: 2,
            relaxed_minor_confluence: 4,
            require_volume_confirmation: true,
            duplicate_window_mins: 60,
            position_fraction: 0.05,
            min_order_qty: 0.001,
            assumed_adverse_move_pct: 5.0,
            research_timeout_secs: 240,
            tp_poll_secs: 30,
            tp_max_hours: 24,
            lease_margin_secs: 120,
        }
    }
}

impl SchedulerConfig {
    /// Clamp fields that are silently corrected rather than rejected.
    /// Currently only the confidence threshold floor/ceiling.
    pub fn normalize(mut self) -> Self {
        self.auto_trade_threshold = self
            .auto_trade_threshold
            .clamp(THRESHOLD_FLOOR, THRESHOLD_CEIL);
        self
    }

    /// Reject structurally invalid configs. Called at the boundary
    /// (config load, admin PUT) — the coordinator assumes a valid record.
    pub fn validate(&self) -> Result<()> {
        if self.cadences_mins.is_empty() {
            anyhow::bail!("at least one cadence must be configured");
        }
        for c in &self.cadences_mins {
            if !ALLOWED_CADENCES.contains(c) {
                anyhow::bail!(
                    "cadence {c}m is not one of the allowed periods {ALLOWED_CADENCES:?}"
                );
            }
        }
        if self.top_n == 0 {
            anyhow::bail!("top_n must be at least 1");
        }
        if !(self.position_fraction > 0.0 && self.position_fraction <= 1.0) {
            anyhow::bail!("position_fraction must be within (0, 1]");
        }
        if self.duplicate_window_mins < 0 {
            anyhow::bail!("duplicate_window_mins must be non-negative");
        }
        if self.tp_poll_secs == 0 {
            anyhow::bail!("tp_poll_secs must be at least 1");
        }
        if self.tp_max_hours == 0 {
            anyhow::bail!("tp_max_hours must be at least 1");
        }
        Ok(())
    }

    /// Longest configured cadence, in minutes.
    pub fn longest_cadence_mins(&self) -> u64 {
        self.cadences_mins.iter().copied().max().unwrap_or(60)
    }

    /// Lease TTL in milliseconds: longest cadence plus a small margin.
    ///
    /// Correctness of the lease protocol assumes this dominates clock
    /// skew plus the maximum run duration.
    pub fn lease_ttl_ms(&self) -> i64 {
        (self.longest_cadence_mins() * 60_000 + self.lease_margin_secs * 1_000) as i64
    }
}

// ---------------------------------------------------------------------------
// Application config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub accounts: Vec<AccountContext>,
    pub universe: UniverseConfig,
    pub research: ResearchConfig,
    pub execution: ExecutionConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UniverseConfig {
    /// Base URL of the exchange REST API used for top-N ranking.
    pub rest_endpoint: String,
    /// Quote asset suffix for tradeable symbols (e.g. "USDT").
    pub quote_asset: String,
    /// Symbols tracked from prior user activity; seeded into the State
    /// Store on first start, merged with the provider's top-N per run.
    #[serde(default)]
    pub tracked: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResearchConfig {
    /// Endpoint of the external research/scoring engine.
    pub endpoint: String,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    /// Paper venue starting balance per account.
    pub paper_initial_balance: f64,
    /// Maximum share of balance the risk gate will let a single trade
    /// put at risk after the assumed adverse move.
    pub max_risk_fraction: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            state_file: "rotor_state.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. The embedded scheduler
    /// section is normalized and validated before use.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.scheduler = config.scheduler.normalize();
        config
            .scheduler
            .validate()
            .context("Invalid [scheduler] section")?;
        if config.accounts.is_empty() {
            anyhow::bail!("at least one [[accounts]] entry is required");
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
