//! Tool-calling SQL assistant.
//!
//! The model plans with `sql_db_list_tables`, `sql_db_schema` and
//! `sql_db_query` against a read-only connection and answers from the rows.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::runtime::{open_sessions, AgentRuntime, ChainBuilder};
use super::{Agent, AgentConfig, AgentKind, ChatRequest, HistoryBackend, Locale};
use crate::chain::{Runnable, ToolCallingChain};
use crate::error::{ColloquyError, Result};
use crate::provider::ChatModel;
use crate::tools::{sql_tools, SqlDatabase, Tool, WebSearchTool};
use crate::types::Message;

const SYSTEM_PROMPT_EN: &str = "You are an agent designed to interact with a SQL database.
Given a question, write a syntactically correct SQL query, run it, look at the results and return the answer.
Unless the user asks for a specific number of examples, return at most 20 rows.
You may order the results by a relevant column to return the most relevant data.
Never select every column of a table (no SELECT *); only ask for the columns relevant to the question.
Double check the query before running it. If running it fails, rewrite the query and try again.
Never issue DML statements (INSERT, UPDATE, DELETE, DROP and the like).
Before querying, always list the tables in the database first; do not skip this step.
Then look up the schema of the tables most relevant to the question.";

const SYSTEM_PROMPT_ZH: &str = "你是一个被设计用于与 SQL 数据库交互的智能代理。
在收到用户的问题后，生成一条语法正确的SQL查询语句来执行，然后查看查询结果并返回答案。
除非用户明确指定希望获取的示例数量，否则查询结果最多返回 20 条记录。
可以根据相关字段对结果进行排序，以返回数据库中最匹配的数据。
永远不要从特定表中查询所有字段（不要使用 SELECT *），只查询与问题相关的字段。
在执行查询之前，你必须仔细检查查询语句。
如果在执行查询时出现错误，必须重写查询并重新尝试。
严禁执行任何数据库DML语句（如 INSERT、UPDATE、DELETE、DROP 等）。
查询开始前，你必须列出数据库中的所有表，以了解可查询的内容，不要跳过这一步。
然后查询与问题最相关的表的 schema（模式结构）。";

pub struct DatabaseAgent {
    runtime: AgentRuntime,
}

impl DatabaseAgent {
    /// Connects to `database_url`. History defaults to the document store.
    pub async fn new(config: &AgentConfig) -> Result<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            ColloquyError::Configuration("database agent requires DB_SQL_URL".into())
        })?;
        let database = SqlDatabase::connect(url).await?;
        Self::with_database(config, Arc::new(database)).await
    }

    /// Build over an already opened database.
    pub async fn with_database(config: &AgentConfig, database: Arc<SqlDatabase>) -> Result<Self> {
        let sessions = open_sessions(config, HistoryBackend::Document).await?;

        let mut tools = sql_tools(database);
        if let Some(search) = &config.web_search {
            tools.push(Arc::new(
                WebSearchTool::new(search.api_key.clone()).with_engine(search.engine.clone()),
            ) as Arc<dyn Tool>);
        }

        let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
            match config.locale {
                Locale::En => SYSTEM_PROMPT_EN,
                Locale::Zh => SYSTEM_PROMPT_ZH,
            }
            .to_string()
        });

        let build_chain: ChainBuilder =
            Arc::new(move |model: Arc<dyn ChatModel>| -> Arc<dyn Runnable> {
                Arc::new(ToolCallingChain::new(model, tools.clone(), system_prompt.clone()))
            });

        Ok(Self {
            runtime: AgentRuntime::new(AgentKind::Db, config, sessions, build_chain)?,
        })
    }
}

#[async_trait]
impl Agent for DatabaseAgent {
    fn kind(&self) -> AgentKind {
        self.runtime.kind()
    }

    fn display_name(&self) -> &str {
        self.runtime.display_name()
    }

    async fn achat(&self, request: ChatRequest) -> Result<String> {
        self.runtime.achat(request).await
    }

    async fn astream_chat(&self, request: ChatRequest) -> Result<BoxStream<'static, String>> {
        self.runtime.astream_chat(request).await
    }

    async fn get_history(&self, session_id: &str, user_id: Option<&str>) -> Vec<Message> {
        self.runtime.get_history(session_id, user_id).await
    }

    async fn clear_history(&self, session_id: &str, user_id: Option<&str>) {
        self.runtime.clear_history(session_id, user_id).await
    }
}
