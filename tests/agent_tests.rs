//! Agents, the agent registry, and the multi-agent manager.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use colloquy::agent::{
    Agent, AgentConfig, AgentKind, AgentRegistry, ChatRequest, DatabaseAgent, Locale,
    MultiAgentManager, WritingAgent,
};
use colloquy::chain::MAX_TOOL_ITERATIONS;
use colloquy::retrieval::{Document, KeywordRetriever};
use colloquy::tools::SqlDatabase;
use colloquy::types::{Message, Role};
use colloquy::util::sqlite::connect_pool;

use common::{registry_with, ScriptedChatModel};

fn config_for(model: &ScriptedChatModel) -> AgentConfig {
    AgentConfig::default().with_providers(registry_with(model))
}

async fn general(model: &ScriptedChatModel) -> Arc<dyn Agent> {
    AgentRegistry::new(registry_with(model))
        .create("general", &AgentConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn general_agent_remembers_the_session() {
    let model = ScriptedChatModel::new("m");
    model.queue_response("Hi Ada!");
    let agent = general(&model).await;

    let answer = agent
        .achat(ChatRequest::new("I'm Ada", "s1").with_user("u1"))
        .await
        .unwrap();
    assert_eq!(answer, "Hi Ada!");

    assert_eq!(
        agent.get_history("s1", Some("u1")).await,
        vec![Message::user("I'm Ada"), Message::assistant("Hi Ada!")]
    );
    assert!(agent.get_history("s1", None).await.is_empty());

    agent.clear_history("s1", Some("u1")).await;
    agent.clear_history("s1", Some("u1")).await;
    assert!(agent.get_history("s1", Some("u1")).await.is_empty());
}

#[tokio::test]
async fn model_failure_becomes_the_apology() {
    let model = ScriptedChatModel::new("m");
    model.queue_failure("boom");
    let agent = general(&model).await;

    let answer = agent.achat(ChatRequest::new("hi", "s1")).await.unwrap();
    assert_eq!(answer, Locale::En.apology());
    assert!(agent.get_history("s1", None).await.is_empty());
}

#[tokio::test]
async fn apology_follows_the_locale() {
    let model = ScriptedChatModel::new("m");
    model.queue_failure("boom");
    let config = AgentConfig {
        locale: Locale::Zh,
        ..AgentConfig::default()
    };
    let agent = AgentRegistry::new(registry_with(&model))
        .create("general", &config)
        .await
        .unwrap();

    assert_eq!(agent.display_name(), "通用助手");
    let answer = agent.achat(ChatRequest::new("你好", "s1")).await.unwrap();
    assert_eq!(answer, "抱歉，我在处理您的问题时遇到了错误。");
}

#[tokio::test]
async fn missing_session_is_an_error() {
    let model = ScriptedChatModel::new("m");
    let agent = general(&model).await;
    let request = ChatRequest {
        message: "hi".into(),
        ..ChatRequest::default()
    };
    assert!(agent.achat(request.clone()).await.is_err());
    assert!(agent.astream_chat(request).await.is_err());
}

#[tokio::test]
async fn stream_failure_ends_with_the_apology() {
    let model = ScriptedChatModel::new("m");
    model.queue_broken_stream("Once upon");
    let agent = general(&model).await;

    let fragments: Vec<String> = agent
        .astream_chat(ChatRequest::new("story", "s1"))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(fragments.concat(), format!("Once upon{}", Locale::En.apology()));
    assert!(agent.get_history("s1", None).await.is_empty());
}

#[tokio::test]
async fn stream_that_cannot_open_yields_one_apology() {
    let model = ScriptedChatModel::new("m");
    model.queue_failure("refused");
    let agent = general(&model).await;

    let fragments: Vec<String> = agent
        .astream_chat(ChatRequest::new("story", "s1"))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(fragments, vec![Locale::En.apology().to_string()]);
}

#[tokio::test]
async fn streamed_turn_is_persisted() {
    let model = ScriptedChatModel::new("m");
    model.queue_response("streamed reply");
    let agent = general(&model).await;

    let fragments: Vec<String> = agent
        .astream_chat(ChatRequest::new("go", "s1"))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(fragments.concat(), "streamed reply");
    assert_eq!(agent.get_history("s1", None).await.len(), 2);
}

#[tokio::test]
async fn per_turn_model_override() {
    let model = ScriptedChatModel::new("m");
    let config = AgentConfig {
        model_name: Some("scripted-small".into()),
        ..config_for(&model)
    };
    let agent = AgentRegistry::new(registry_with(&model))
        .create("general", &config)
        .await
        .unwrap();

    agent.achat(ChatRequest::new("one", "s1")).await.unwrap();
    agent
        .achat(ChatRequest::new("two", "s1").with_model("scripted-large"))
        .await
        .unwrap();
    agent
        .achat(ChatRequest::new("three", "s1").with_provider("unknown"))
        .await
        .unwrap();

    assert_eq!(
        model.models_called(),
        vec!["scripted-small", "scripted-large", "scripted-small"]
    );
    assert_eq!(agent.get_history("s1", None).await.len(), 6);
}

#[tokio::test]
async fn registry_caches_by_kind_and_config() {
    let model = ScriptedChatModel::new("m");
    let registry = AgentRegistry::new(registry_with(&model));
    let config = AgentConfig::default();

    let first = registry.create("general", &config).await.unwrap();
    let again = registry.create("GENERAL", &config).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let unknown = registry.create("poetry", &config).await.unwrap();
    assert!(Arc::ptr_eq(&first, &unknown));
    assert_eq!(unknown.kind(), AgentKind::General);

    let other = AgentConfig {
        history_limit: Some(4),
        ..AgentConfig::default()
    };
    let different = registry.create("general", &other).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &different));
    assert_eq!(registry.cached_count(), 2);
}

#[tokio::test]
async fn writing_agent_grounds_answers_in_retrieved_documents() {
    let model = ScriptedChatModel::new("m");
    model.queue_response("Dragons hoard gold.");
    model.queue_response("what do dragons hoard");
    model.queue_response("They also hoard gems.");
    let retriever = Arc::new(KeywordRetriever::from_documents(vec![
        Document::new("Dragons hoard gold and gems in mountain caves."),
        Document::new("Unicorns live in enchanted forests."),
    ]));
    let agent = WritingAgent::with_retriever(&config_for(&model), retriever)
        .await
        .unwrap();
    assert_eq!(agent.kind(), AgentKind::Writing);

    agent
        .achat(ChatRequest::new("Tell me about dragons", "s1"))
        .await
        .unwrap();
    let first = &model.requests()[0];
    assert_eq!(first[0].role, Role::System);
    assert!(first[0].content.contains("Dragons hoard gold"));
    assert!(!first[0].content.contains("Unicorns"));

    // second turn: condense with history, then answer
    let answer = agent.achat(ChatRequest::new("what else?", "s1")).await.unwrap();
    assert_eq!(answer, "They also hoard gems.");
    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].len(), 4);
    assert_eq!(requests[2].last().unwrap().content, "what else?");
    assert!(requests[2][0].content.contains("Dragons hoard gold"));
}

#[tokio::test]
async fn database_agent_answers_through_sql_tools() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("shop.db").display());
    let pool = connect_pool(&url, 1).await.unwrap();
    sqlx::query("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO customers (name) VALUES ('ada'), ('lin')")
        .execute(&pool)
        .await
        .unwrap();

    let model = ScriptedChatModel::new("m");
    model.queue_tool_call("call_1", "sql_db_list_tables", json!({}));
    model.queue_tool_call(
        "call_2",
        "sql_db_query",
        json!({"query": "SELECT COUNT(*) AS total FROM customers"}),
    );
    model.queue_tool_call("call_3", "sql_db_drop_everything", json!({}));
    model.queue_response("There are 2 customers.");

    let agent = DatabaseAgent::with_database(
        &config_for(&model),
        Arc::new(SqlDatabase::from_pool(pool)),
    )
    .await
    .unwrap();

    let answer = agent
        .achat(ChatRequest::new("How many customers?", "s1"))
        .await
        .unwrap();
    assert_eq!(answer, "There are 2 customers.");

    let last = model.last_request();
    let tool_results: Vec<&Message> = last.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_results.len(), 3);
    assert_eq!(tool_results[0].content, "customers");
    assert!(tool_results[1].content.contains('2'));
    assert!(tool_results[2].content.contains("not found"));

    // only the user turn and the final answer are remembered
    assert_eq!(agent.get_history("s1", None).await.len(), 2);
}

#[tokio::test]
async fn database_agent_apologizes_when_tools_never_settle() {
    let model = ScriptedChatModel::new("m");
    for i in 0..MAX_TOOL_ITERATIONS {
        model.queue_tool_call(&format!("call_{i}"), "sql_db_list_tables", json!({}));
    }
    model.queue_response("never reached");

    let pool = connect_pool("sqlite::memory:", 1).await.unwrap();
    let agent = DatabaseAgent::with_database(
        &config_for(&model),
        Arc::new(SqlDatabase::from_pool(pool)),
    )
    .await
    .unwrap();

    let answer = agent
        .achat(ChatRequest::new("list everything", "s1"))
        .await
        .unwrap();
    assert_eq!(answer, Locale::En.apology());
    assert_eq!(model.requests().len(), MAX_TOOL_ITERATIONS);
    assert!(agent.get_history("s1", None).await.is_empty());
}

#[tokio::test]
async fn database_agent_requires_a_url() {
    let model = ScriptedChatModel::new("m");
    let err = DatabaseAgent::new(&config_for(&model)).await.err().unwrap();
    assert!(err.to_string().contains("DB_SQL_URL"));
}

#[tokio::test]
async fn manager_falls_back_to_the_first_working_agent() {
    let model = ScriptedChatModel::new("m");
    let registry = Arc::new(AgentRegistry::new(registry_with(&model)));
    let manager = MultiAgentManager::new(
        vec![
            ("db".to_string(), AgentConfig::default()),
            ("general".to_string(), AgentConfig::default()),
        ],
        registry,
    )
    .await;

    assert_eq!(manager.configured_agents(), vec!["db", "general"]);
    assert_eq!(manager.available_agents(), vec!["general"]);
    assert_eq!(manager.unavailable_agents(), vec!["db"]);
    assert_eq!(manager.default_agent(), Some("general"));
    assert!(manager.failure("db").unwrap().contains("DB_SQL_URL"));
    manager.ensure_available().unwrap();

    let agent = manager.get_agent(Some("db")).unwrap();
    assert_eq!(agent.kind(), AgentKind::General);
    assert_eq!(manager.get_agent(None).unwrap().kind(), AgentKind::General);

    let names: Vec<_> = manager
        .agent_details()
        .into_iter()
        .map(|info| (info.id, info.name))
        .collect();
    assert_eq!(
        names,
        vec![
            ("db".to_string(), "db assistant".to_string()),
            ("general".to_string(), "General Assistant".to_string()),
        ]
    );
}

#[tokio::test]
async fn manager_without_agents_cannot_resolve() {
    let model = ScriptedChatModel::new("m");
    let registry = Arc::new(AgentRegistry::new(registry_with(&model)));
    let manager =
        MultiAgentManager::new(vec![("db".to_string(), AgentConfig::default())], registry).await;

    assert!(manager.default_agent().is_none());
    assert!(manager.ensure_available().is_err());
    let err = manager.get_agent(Some("db")).err().unwrap();
    assert!(err.is_fatal_at_startup());
}

#[test]
fn blocking_chat_outside_a_runtime() {
    let model = ScriptedChatModel::new("m");
    model.queue_response("sync answer");
    model.queue_response("sync stream");
    let agent = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(general(&model));

    assert_eq!(agent.chat(ChatRequest::new("hi", "s1")).unwrap(), "sync answer");
    let fragments: Vec<String> = agent
        .stream_chat(ChatRequest::new("again", "s1"))
        .unwrap()
        .map(|f| f.unwrap())
        .collect();
    assert_eq!(fragments.concat(), "sync stream");
}
