use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::bootstrap::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agents: usize,
    pub commands: usize,
    pub checked_at: String,
}

/// GET /health — liveness plus a glance at what routing is loaded.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let routing = state.routing();
    Json(HealthResponse {
        status: "ok",
        agents: routing.agents.len(),
        commands: routing.commands.len(),
        checked_at: Utc::now().to_rfc3339(),
    })
}
