use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use parlance_core::session::SessionStore;

use crate::bootstrap::AppState;

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct AgentEntry {
    pub name: String,
    pub active: bool,
}

/// GET /api/agents — configured agents plus the default pseudo-agent,
/// flagged with the session's sticky selection.
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentEntry>> {
    let routing = state.routing();
    let current = state.session.current_agent();

    let mut entries = routing
        .agents
        .iter()
        .map(|agent| AgentEntry {
            name: agent.name.clone(),
            active: current.as_deref() == Some(agent.name.as_str()),
        })
        .collect::<Vec<_>>();
    entries.push(AgentEntry { name: "default".to_string(), active: current.is_none() });

    Json(entries)
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub agent: String,
}

#[derive(Debug, Serialize)]
pub struct SwitchResponse {
    pub message: String,
}

/// POST /api/agents/switch — validated sticky-agent change; "default"
/// clears the selection.
pub async fn switch_agent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchRequest>,
) -> Result<Json<SwitchResponse>, (StatusCode, String)> {
    let routing = state.routing();

    if request.agent != "default" && routing.agent(&request.agent).is_none() {
        return Err((StatusCode::BAD_REQUEST, format!("Agent '{}' not found", request.agent)));
    }

    let target = (request.agent != "default").then_some(request.agent.as_str());
    state
        .session
        .save_current_agent(target)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    info!(agent = %request.agent, "agent switched via api");
    Ok(Json(SwitchResponse { message: format!("Switched to agent '{}'", request.agent) }))
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub agents: usize,
    pub commands: usize,
}

/// POST /reload-config — re-read the routing file and swap it in.
pub async fn reload_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, (StatusCode, String)> {
    match state.reload_routing() {
        Ok(routing) => Ok(Json(ReloadResponse {
            status: "ok",
            agents: routing.agents.len(),
            commands: routing.commands.len(),
        })),
        Err(err) => {
            error!(error = %err, "routing reload failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to reload config: {err}")))
        }
    }
}
