//! Admin API route handlers.
//!
//! All endpoints return JSON. Handlers read through the same Lock and
//! State Store contracts the coordinator uses, so what the API reports
//! is exactly what the scheduler will act on next tick. The scheduler
//! config PUT is the one mutating endpoint: validate, clamp, then full
//! overwrite of the shared record.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::coordinator::lease::lease_key;
use crate::coordinator::runner::SCHEDULER_CONFIG_ID;
use crate::coordinator::rotation::ROTATION_STATE_ID;
use crate::stores::{LockStore, StateStore};
use crate::types::RotationState;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub state: Arc<dyn StateStore>,
    pub locks: Arc<dyn LockStore>,
    /// Boot-time scheduler config, reported until an admin write lands.
    pub boot_scheduler: SchedulerConfig,
    pub agent_name: String,
}

pub type AppState = Arc<DashboardState>;

impl DashboardState {
    pub fn new(
        state: Arc<dyn StateStore>,
        locks: Arc<dyn LockStore>,
        boot_scheduler: SchedulerConfig,
        agent_name: String,
    ) -> Self {
        DashboardState {
            state,
            locks,
            boot_scheduler,
            agent_name,
        }
    }

    /// The scheduler config the coordinator will use next tick.
    async fn effective_scheduler(&self) -> SchedulerConfig {
        match self.state.get(SCHEDULER_CONFIG_ID).await {
            Ok(Some(value)) => serde_json::from_value(value)
                .map(SchedulerConfig::normalize)
                .unwrap_or_else(|_| self.boot_scheduler.clone()),
            _ => self.boot_scheduler.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    pub rotation: RotationState,
    pub leases: Vec<LeaseInfo>,
}

/// Lease view for one cadence.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseInfo {
    pub cadence_mins: u64,
    pub held: bool,
    pub owner_id: Option<String>,
    pub expires_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let rotation: RotationState = match state.state.get(ROTATION_STATE_ID).await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
        Ok(None) => RotationState::default(),
        Err(e) => {
            warn!(error = %e, "Status read failed");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let cfg = state.effective_scheduler().await;
    let mut leases = Vec::with_capacity(cfg.cadences_mins.len());
    for cadence_mins in &cfg.cadences_mins {
        let status = state
            .locks
            .status(&lease_key(*cadence_mins))
            .await
            .map_err(|e| {
                warn!(error = %e, "Lease status read failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        leases.push(match status {
            Some(s) => LeaseInfo {
                cadence_mins: *cadence_mins,
                held: s.held,
                owner_id: Some(s.owner_id),
                expires_at: Some(s.expires_at.to_rfc3339()),
            },
            None => LeaseInfo {
                cadence_mins: *cadence_mins,
                held: false,
                owner_id: None,
                expires_at: None,
            },
        });
    }

    Ok(Json(StatusResponse {
        agent: state.agent_name.clone(),
        rotation,
        leases,
    }))
}

/// GET /api/scheduler
pub async fn get_scheduler(State(state): State<AppState>) -> Json<SchedulerConfig> {
    Json(state.effective_scheduler().await)
}

/// PUT /api/scheduler
///
/// Full overwrite of the shared scheduler record. The threshold is
/// clamped silently; structural problems are rejected with a 400 so a
/// bad config can never reach the stored copy.
pub async fn put_scheduler(
    State(state): State<AppState>,
    Json(update): Json<SchedulerConfig>,
) -> Result<Json<SchedulerConfig>, (StatusCode, String)> {
    let cfg = update.normalize();
    cfg.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let value = serde_json::to_value(&cfg)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state
        .state
        .set(SCHEDULER_CONFIG_ID, value, false)
        .await
        .map_err(|e| {
            warn!(error = %e, "Scheduler config write failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    info!(
        cadences = ?cfg.cadences_mins,
        threshold = cfg.auto_trade_threshold,
        enabled = cfg.auto_trade_enabled,
        "Scheduler config updated via admin API"
    );
    Ok(Json(cfg))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
