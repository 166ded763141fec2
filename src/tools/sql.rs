//! Read-only SQL tools for the database agent.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, ValueRef};
use tracing::{debug, info};

use super::tool::{AgentTool, Tool};
use super::types::AgentToolParameters;
use crate::error::{ColloquyError, Result};
use crate::util::sqlite::connect_read_only_pool;

/// Maximum rows returned by a single query.
pub const MAX_QUERY_ROWS: usize = 50;

const READ_ONLY_KEYWORDS: &[&str] = &["select", "with", "explain", "pragma"];

/// Keywords that modify data, schema, or connection state.
const WRITE_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "create", "alter", "attach", "detach", "vacuum",
    "reindex", "analyze", "begin", "commit", "rollback", "savepoint", "release",
];

/// Pragmas that may take an argument and only read schema information.
const INTROSPECTION_PRAGMAS: &[&str] = &[
    "table_info",
    "table_xinfo",
    "table_list",
    "index_list",
    "index_info",
    "index_xinfo",
    "foreign_key_list",
];

/// Handle to the database the agent may inspect.
#[derive(Debug, Clone)]
pub struct SqlDatabase {
    pool: SqlitePool,
    max_rows: usize,
}

impl SqlDatabase {
    /// Open `url` read-only. The database must already exist.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = connect_read_only_pool(url, 4).await?;
        info!(url, "connected SQL database");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_rows: MAX_QUERY_ROWS,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// User tables, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    /// CREATE statements plus up to three sample rows for each table.
    pub async fn table_info(&self, tables: &[&str]) -> Result<String> {
        let known = self.list_tables().await?;
        let mut out = Vec::new();
        for table in tables {
            if !known.iter().any(|k| k == table) {
                return Err(ColloquyError::InvalidArgument(format!(
                    "table '{table}' does not exist; available tables: {}",
                    known.join(", ")
                )));
            }
            let (ddl,): (String,) =
                sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(*table)
                    .fetch_one(&self.pool)
                    .await?;
            let sample = self
                .render_query(&format!("SELECT * FROM \"{table}\" LIMIT 3"), 3)
                .await?;
            out.push(format!(
                "{ddl}\n\n/*\n3 rows from {table} table:\n{sample}\n*/"
            ));
        }
        Ok(out.join("\n\n"))
    }

    /// Run a read-only statement and render the rows as text.
    pub async fn run(&self, sql: &str) -> Result<String> {
        let statement = ensure_read_only(sql)?;
        debug!(sql = statement, "running SQL query");
        self.render_query(statement, self.max_rows).await
    }

    async fn render_query(&self, sql: &str, max_rows: usize) -> Result<String> {
        let rows: Vec<SqliteRow> = sqlx::query(sql)
            .fetch(&self.pool)
            .take(max_rows)
            .try_collect()
            .await?;

        let Some(first) = rows.first() else {
            return Ok(String::new());
        };
        let header = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        let body = rows.iter().map(|row| {
            (0..row.columns().len())
                .map(|idx| render_value(row, idx))
                .collect::<Vec<_>>()
                .join(" | ")
        });
        Ok(std::iter::once(header)
            .chain(body)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Accept a single SELECT/WITH/EXPLAIN/PRAGMA statement; return it trimmed.
///
/// Keywords are matched outside string literals, quoted identifiers and
/// comments, so a CTE cannot smuggle in a write.
pub fn ensure_read_only(sql: &str) -> Result<&str> {
    let statement = sql.trim().trim_end_matches(';').trim();
    let tokens = tokenize(statement);
    let keyword = match tokens.first() {
        Some(Token::Word(word)) => word.as_str(),
        Some(Token::Punct(c)) => {
            return Err(ColloquyError::InvalidArgument(format!(
                "statement must start with a keyword, got '{c}'"
            )))
        }
        None => return Err(ColloquyError::InvalidArgument("empty SQL statement".into())),
    };
    if tokens.contains(&Token::Punct(';')) {
        return Err(ColloquyError::InvalidArgument(
            "only a single SQL statement is allowed".into(),
        ));
    }
    if !READ_ONLY_KEYWORDS.contains(&keyword) {
        return Err(ColloquyError::InvalidArgument(format!(
            "only read-only statements are allowed, got '{keyword}'"
        )));
    }

    for (idx, token) in tokens.iter().enumerate() {
        let Token::Word(word) = token else { continue };
        let replace_into = word == "replace"
            && matches!(tokens.get(idx + 1), Some(Token::Word(next)) if next == "into");
        if WRITE_KEYWORDS.contains(&word.as_str()) || replace_into {
            return Err(ColloquyError::InvalidArgument(format!(
                "statement contains '{word}'; only reads are allowed"
            )));
        }
    }

    if keyword == "pragma" {
        check_pragma(&tokens)?;
    }
    Ok(statement)
}

/// Bare pragmas only query; the call form is allowed for introspection.
fn check_pragma(tokens: &[Token]) -> Result<()> {
    if tokens.contains(&Token::Punct('=')) {
        return Err(ColloquyError::InvalidArgument(
            "pragma assignments are not allowed".into(),
        ));
    }
    let name_at = if tokens.get(2) == Some(&Token::Punct('.')) { 3 } else { 1 };
    let Some(Token::Word(name)) = tokens.get(name_at) else {
        return Err(ColloquyError::InvalidArgument("pragma name is missing".into()));
    };
    if tokens.contains(&Token::Punct('(')) && !INTROSPECTION_PRAGMAS.contains(&name.as_str()) {
        return Err(ColloquyError::InvalidArgument(format!(
            "pragma '{name}' cannot take an argument here"
        )));
    }
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Token {
    /// Lowercased bare word.
    Word(String),
    Punct(char),
}

/// Split SQL into bare words and punctuation, skipping literals, quoted
/// identifiers and comments.
fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => skip_quoted(&mut chars, c),
            '[' => skip_quoted(&mut chars, ']'),
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = c.to_lowercase().collect::<String>();
                while let Some(&next) = chars.peek() {
                    if !(next.is_alphanumeric() || next == '_' || next == '$') {
                        break;
                    }
                    word.extend(next.to_lowercase());
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            c if c.is_whitespace() => {}
            c => tokens.push(Token::Punct(c)),
        }
    }
    tokens
}

/// Consume up to the closing `close`; a doubled closer is an escape.
fn skip_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, close: char) {
    while let Some(c) = chars.next() {
        if c == close {
            if chars.peek() == Some(&close) {
                chars.next();
            } else {
                return;
            }
        }
    }
}

fn render_value(row: &SqliteRow, idx: usize) -> String {
    if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(false) {
        return "NULL".to_string();
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return v;
    }
    match row.try_get::<Vec<u8>, _>(idx) {
        Ok(bytes) => format!("<{} bytes>", bytes.len()),
        Err(_) => "?".to_string(),
    }
}

/// `sql_db_list_tables`, `sql_db_schema` and `sql_db_query` over `db`.
pub fn sql_tools(db: Arc<SqlDatabase>) -> Vec<Arc<dyn Tool>> {
    let list_db = db.clone();
    let list_tables = AgentTool::new(
        "sql_db_list_tables",
        "List the tables in the database. Call this first to see what can be queried.",
        AgentToolParameters::empty(),
        move |_args, _ctx| {
            let db = list_db.clone();
            async move { Ok::<_, ColloquyError>(Value::String(db.list_tables().await?.join(", "))) }
        },
    );

    let schema_db = db.clone();
    let schema = AgentTool::new(
        "sql_db_schema",
        "Show the schema and sample rows for a comma-separated list of tables. \
         Make sure the tables exist by calling sql_db_list_tables first.",
        AgentToolParameters::object()
            .string("table_names", "Comma-separated table names", true)
            .build(),
        move |args, _ctx| {
            let db = schema_db.clone();
            async move {
                let names = args.get_str("table_names")?.to_string();
                let tables: Vec<&str> = names
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect();
                Ok::<_, ColloquyError>(Value::String(db.table_info(&tables).await?))
            }
        },
    );

    let query_db = db;
    let query = AgentTool::new(
        "sql_db_query",
        "Run a single read-only SQL query and return the rows. \
         If the query fails, rewrite it and try again.",
        AgentToolParameters::object()
            .string("query", "A read-only SQL statement", true)
            .build(),
        move |args, _ctx| {
            let db = query_db.clone();
            async move {
                let sql = args.get_str("query")?.to_string();
                Ok::<_, ColloquyError>(Value::String(db.run(&sql).await?))
            }
        },
    );

    vec![Arc::new(list_tables), Arc::new(schema), Arc::new(query)]
}
