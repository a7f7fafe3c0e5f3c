//! API request handlers

use axum::extract::State;
use axum::Json;

use crate::clock::SharedClock;
use crate::supervisor::{HealerStatus, SharedState, StatusReport};

/// Shared state for the API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Supervisor state published by the control loop
    pub supervisor: SharedState,
    /// Time source for uptime
    pub clock: SharedClock,
}

/// GET /health
pub async fn get_health(State(state): State<ApiState>) -> Json<HealerStatus> {
    let supervisor = state.supervisor.read().await;
    Json(supervisor.health(state.clock.now()))
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> Json<StatusReport> {
    let supervisor = state.supervisor.read().await;
    Json(supervisor.report(state.clock.now()))
}
