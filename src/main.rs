//! ROTOR — Rotation-Ordered Trading Orchestration Runtime
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the state and lock stores, wires the collaborator providers,
//! and starts the cadence coordinator plus the admin API with graceful
//! shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use rotor::config::AppConfig;
use rotor::coordinator::runner::TRACKED_SYMBOLS_ID;
use rotor::coordinator::Coordinator;
use rotor::dashboard;
use rotor::dashboard::routes::DashboardState;
use rotor::notify::{Notifier, TelegramNotifier};
use rotor::providers::{
    BasicRiskGate, ExecutionService, PaperExchange, ResearchHttpClient, RiskGate,
    UniverseProvider, VolumeRankedUniverse,
};
use rotor::providers::ResearchService;
use rotor::stores::{FileStateStore, LockStore, MemoryLockStore, StateStore};

const BANNER: &str = r#"
 ____   ___ _____ ___  ____
|  _ \ / _ \_   _/ _ \|  _ \
| |_) | | | || || | | | |_) |
|  _ <| |_| || || |_| |  _ <
|_| \_\\___/ |_| \___/|_| \_\

  Rotation-Ordered Trading Orchestration Runtime
  v0.1.0 — Cadence Scheduler
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        cadences = ?cfg.scheduler.cadences_mins,
        mode = ?cfg.scheduler.mode,
        auto_trade = cfg.scheduler.auto_trade_enabled,
        accounts = cfg.accounts.len(),
        "ROTOR starting up"
    );

    // -- Stores -----------------------------------------------------------

    let state: Arc<dyn StateStore> = Arc::new(FileStateStore::open(&cfg.storage.state_file)?);
    // In-process lock backend; swap for a shared backend when running
    // multiple instances against one state file.
    let locks: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());

    // Seed tracked symbols from config on first start only; after that
    // the stored copy is authoritative.
    if state.get(TRACKED_SYMBOLS_ID).await?.is_none() && !cfg.universe.tracked.is_empty() {
        info!(symbols = ?cfg.universe.tracked, "Seeding tracked symbols");
        state
            .set(
                TRACKED_SYMBOLS_ID,
                serde_json::to_value(&cfg.universe.tracked)?,
                false,
            )
            .await?;
    }

    // -- Collaborators ----------------------------------------------------

    let universe: Arc<dyn UniverseProvider> = Arc::new(VolumeRankedUniverse::new(
        &cfg.universe.rest_endpoint,
        &cfg.universe.quote_asset,
    )?);

    let research_key = cfg
        .research
        .api_key_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok());
    let research: Arc<dyn ResearchService> =
        Arc::new(ResearchHttpClient::new(&cfg.research.endpoint, research_key)?);

    let account_ids: Vec<String> = cfg.accounts.iter().map(|a| a.id.clone()).collect();
    let exec: Arc<dyn ExecutionService> = Arc::new(PaperExchange::new(
        &account_ids,
        cfg.execution.paper_initial_balance,
    ));

    let risk: Arc<dyn RiskGate> = Arc::new(BasicRiskGate::new(
        exec.clone(),
        cfg.execution.max_risk_fraction,
    ));

    let notifier: Option<Arc<dyn Notifier>> = build_notifier(&cfg);
    if notifier.is_none() {
        warn!("No Telegram credentials configured — notifications disabled");
    }

    // -- Coordinator + admin API ------------------------------------------

    let coordinator = Coordinator::new(
        cfg.clone(),
        locks.clone(),
        state.clone(),
        universe,
        research,
        risk,
        exec,
        notifier,
    );
    info!(owner = %coordinator.owner_id(), "Coordinator identity");

    if cfg.dashboard.enabled {
        let dash_state = Arc::new(DashboardState::new(
            state.clone(),
            locks.clone(),
            cfg.scheduler.clone(),
            cfg.agent.name.clone(),
        ));
        dashboard::spawn_dashboard(dash_state, cfg.dashboard.port)?;
    }

    let mut handle = coordinator.start();

    info!("Scheduler running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    // Cancel cadence timers only: in-flight runs and TP watchers finish
    // naturally, and any held lease expires passively.
    info!("Shutdown signal received.");
    handle.stop();
    info!("ROTOR shut down cleanly.");

    Ok(())
}

/// Build the Telegram notifier when both env-var names resolve.
fn build_notifier(cfg: &AppConfig) -> Option<Arc<dyn Notifier>> {
    let token = cfg
        .alerts
        .telegram_bot_token_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok())?;
    let chat_id = cfg
        .alerts
        .telegram_chat_id_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok())?;

    match TelegramNotifier::new(token, chat_id) {
        Ok(n) => Some(Arc::new(n)),
        Err(e) => {
            warn!(error = %e, "Failed to build Telegram notifier");
            None
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rotor=info"));

    let json_logging = std::env::var("ROTOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
