//! HTTP API.
//!
//! | route                   | handler                  |
//! |-------------------------|--------------------------|
//! | `POST /api/chat`        | [`chat::chat`]           |
//! | `POST /api/stream_chat` | [`chat::stream_chat`]    |
//! | `GET /api/agents`       | [`info::list_agents`]    |
//! | `GET /api/models`       | [`info::list_models`]    |
//! | `GET /api/health`       | [`info::health`]         |

pub mod chat;
pub mod info;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::MultiAgentManager;
use crate::error::{ColloquyError, Result};
use crate::provider::ProviderRegistry;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<MultiAgentManager>,
    pub providers: Arc<ProviderRegistry>,
}

impl AppState {
    pub fn new(agents: Arc<MultiAgentManager>, providers: Arc<ProviderRegistry>) -> Self {
        Self { agents, providers }
    }
}

/// Routes under `/api`.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat", post(chat::chat))
        .route("/stream_chat", post(chat::stream_chat))
        .route("/agents", get(info::list_agents))
        .route("/models", get(info::list_models))
        .route("/health", get(info::health))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind `host:port` and serve until the process stops.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "listening");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

/// Handler error rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<ColloquyError> for ApiError {
    fn from(e: ColloquyError) -> Self {
        match e {
            ColloquyError::Configuration(msg) | ColloquyError::InvalidArgument(msg) => {
                ApiError::BadRequest(msg)
            }
            ColloquyError::AgentResolution(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
