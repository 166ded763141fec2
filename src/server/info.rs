//! Discovery and health endpoints.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::agent::AgentInfo;

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub configured_agents: Vec<String>,
    pub available_agents: Vec<String>,
    pub unavailable_agents: Vec<String>,
    pub agent_details: Vec<AgentInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    let agents = &state.agents;
    Json(AgentListResponse {
        configured_agents: agents.configured_agents(),
        available_agents: agents.available_agents(),
        unavailable_agents: agents.unavailable_agents(),
        agent_details: agents.agent_details(),
    })
}

/// GET /api/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.providers.all_available_models(),
    })
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, message) = if state.providers.is_empty() {
        ("unhealthy", "no model provider available")
    } else if state.agents.available_agents().is_empty() {
        ("unhealthy", "no agent available")
    } else {
        ("healthy", "service is running")
    };
    Json(HealthResponse {
        status: status.to_string(),
        message: message.to_string(),
    })
}
