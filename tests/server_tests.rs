#![cfg(feature = "server")]

//! HTTP API against a live listener.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use colloquy::agent::{AgentConfig, AgentRegistry, MultiAgentManager};
use colloquy::server::{create_router, AppState};

use common::{registry_with, ScriptedChatModel};

async fn spawn(model: &ScriptedChatModel, agents: &[&str]) -> String {
    let providers = registry_with(model);
    let registry = Arc::new(AgentRegistry::new(providers.clone()));
    let configs = agents
        .iter()
        .map(|name| (name.to_string(), AgentConfig::default()))
        .collect();
    let manager = Arc::new(MultiAgentManager::new(configs, registry).await);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(AppState::new(manager, providers));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

#[tokio::test]
async fn chat_returns_answer_and_keeps_session() {
    let model = ScriptedChatModel::new("m");
    model.queue_response("Hello there");
    let base = spawn(&model, &["general"]).await;
    let client = reqwest::Client::new();

    let reply: Value = client
        .post(format!("{base}/chat"))
        .json(&json!({"message": "hi", "chat_id": "c1", "agent_type": "general"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply, json!({"chat_id": "c1", "message": "Hello there"}));

    client
        .post(format!("{base}/chat"))
        .json(&json!({"message": "again", "chat_id": "c1"}))
        .send()
        .await
        .unwrap();
    // system + prior turn + new input
    assert_eq!(model.last_request().len(), 4);
}

#[tokio::test]
async fn chat_generates_a_session_id() {
    let model = ScriptedChatModel::new("m");
    let base = spawn(&model, &["general"]).await;

    let reply: Value = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&json!({"message": "hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let chat_id = reply["chat_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(chat_id).is_ok());
    assert_eq!(reply["message"], "echo: hi");
}

#[tokio::test]
async fn chat_without_agents_reports_an_error_reply() {
    let model = ScriptedChatModel::new("m");
    let base = spawn(&model, &["db"]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&json!({"message": "hi", "chat_id": "c1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let reply: Value = resp.json().await.unwrap();
    assert_eq!(reply["error"], true);
    assert_eq!(reply["chat_id"], "c1");
}

#[tokio::test]
async fn stream_chat_emits_data_then_done() {
    let model = ScriptedChatModel::new("m");
    model.queue_response("streamed words");
    let base = spawn(&model, &["general"]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/stream_chat"))
        .json(&json!({"message": "hi", "chat_id": "c1"}))
        .send()
        .await
        .unwrap();
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = resp.text().await.unwrap();
    let data: String = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|d| *d != "[DONE]")
        .collect();
    assert_eq!(data, "streamed words");
    assert!(body.contains("event: end\ndata: [DONE]"));
}

#[tokio::test]
async fn discovery_endpoints() {
    let model = ScriptedChatModel::new("m");
    let base = spawn(&model, &["db", "general"]).await;
    let client = reqwest::Client::new();

    let agents: Value = client
        .get(format!("{base}/agents"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(agents["configured_agents"], json!(["db", "general"]));
    assert_eq!(agents["available_agents"], json!(["general"]));
    assert_eq!(agents["unavailable_agents"], json!(["db"]));
    assert_eq!(agents["agent_details"][1]["name"], "General Assistant");

    let models: Value = client
        .get(format!("{base}/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        models["models"]["scripted"],
        json!(["scripted-small", "scripted-large"])
    );

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
}
