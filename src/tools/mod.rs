//! Tool system for function calling.

pub mod arguments;
pub mod search;
pub mod sql;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use search::WebSearchTool;
pub use sql::{sql_tools, SqlDatabase};
pub use tool::{definitions, AgentTool, Tool, ToolExecutionContext};
pub use types::AgentToolParameters;
