//! Chat endpoints.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::agent::ChatRequest;

fn default_agent_type() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub chat_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl ChatBody {
    /// Session id, generated when the client sent none.
    fn chat_id(&self) -> String {
        self.chat_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Agent request with an unknown provider replaced by the default.
    fn into_request(self, chat_id: &str, state: &AppState) -> ChatRequest {
        let provider_name = self
            .provider_name
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| {
                let normalized = state.providers.normalize_provider_name(Some(p));
                if normalized.as_deref() != Some(p) {
                    warn!(requested = p, using = ?normalized, "unknown provider in request");
                }
                normalized
            });
        ChatRequest {
            message: self.message,
            session_id: Some(chat_id.to_string()),
            user_id: self.user_id,
            provider_name,
            model_name: self.model_name,
        }
    }
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let chat_id = body.chat_id();
    let agent = match state.agents.get_agent(Some(body.agent_type.as_str())) {
        Ok(agent) => agent,
        Err(e) => {
            warn!(agent_type = %body.agent_type, error = %e, "agent unavailable");
            return Ok(Json(ChatReply {
                chat_id,
                message: e.to_string(),
                error: Some(true),
            }));
        }
    };
    info!(chat_id = %chat_id, agent = %agent.kind(), "chat request");

    let request = body.into_request(&chat_id, &state);
    let message = agent.achat(request).await?;
    Ok(Json(ChatReply {
        chat_id,
        message,
        error: None,
    }))
}

/// POST /api/stream_chat
///
/// One `data` event per fragment, then an `end` event carrying `[DONE]`.
/// An unavailable agent yields a single `error` event.
pub async fn stream_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let chat_id = body.chat_id();
    let events: BoxStream<'static, Result<Event, Infallible>> =
        match state.agents.get_agent(Some(body.agent_type.as_str())) {
            Ok(agent) => {
                info!(chat_id = %chat_id, agent = %agent.kind(), "stream chat request");
                let request = body.into_request(&chat_id, &state);
                match agent.astream_chat(request).await {
                    Ok(fragments) => Box::pin(
                        fragments
                            .map(|fragment| Ok(Event::default().data(fragment)))
                            .chain(tokio_stream::once(Ok(Event::default()
                                .event("end")
                                .data("[DONE]")))),
                    ),
                    Err(e) => error_event(e.to_string()),
                }
            }
            Err(e) => {
                warn!(agent_type = %body.agent_type, error = %e, "agent unavailable");
                error_event(e.to_string())
            }
        };
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn error_event(message: String) -> BoxStream<'static, Result<Event, Infallible>> {
    Box::pin(tokio_stream::once(Ok(Event::default()
        .event("error")
        .data(message))))
}
