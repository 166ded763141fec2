//! Tool-calling executor loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::conversation::compose;
use super::{ChainInput, ChainOutput, Runnable};
use crate::error::{ColloquyError, Result};
use crate::provider::ChatModel;
use crate::tools::{definitions, Tool, ToolArguments, ToolExecutionContext};
use crate::types::{Message, ToolCall};

/// Maximum tool loop iterations per turn.
pub const MAX_TOOL_ITERATIONS: usize = 20;

/// Plan, call tools, observe; repeat until the model answers in text.
pub struct ToolCallingChain {
    model: Arc<dyn ChatModel>,
    tools: Vec<Arc<dyn Tool>>,
    system_prompt: String,
    max_iterations: usize,
}

impl ToolCallingChain {
    /// Bind `tools` to `model`.
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let model = if tools.is_empty() {
            model
        } else {
            model.bind_tools(definitions(&tools))
        };
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations: MAX_TOOL_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    async fn call_tool(&self, call: &ToolCall) -> Message {
        let result = match self.tools.iter().find(|t| t.name() == call.name) {
            Some(tool) => {
                let args = ToolArguments::new(call.arguments.clone());
                let ctx = ToolExecutionContext {
                    tool_call_id: Some(call.id.clone()),
                    session_id: None,
                };
                match tool.execute(&args, &ctx).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool execution failed");
                        json!({ "error": e.to_string() })
                    }
                }
            }
            None => {
                warn!(tool = %call.name, "tool not found");
                json!({ "error": format!("Tool '{}' not found", call.name) })
            }
        };
        Message::tool_result(call.id.clone(), render(result))
    }
}

fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl Runnable for ToolCallingChain {
    async fn invoke(&self, input: ChainInput) -> Result<ChainOutput> {
        let mut messages = compose(&self.system_prompt, input.history, input.input);
        let mut steps = Vec::new();
        let mut last_tool = String::new();

        for iteration in 0..self.max_iterations {
            debug!(iteration, "tool loop: calling model");
            let reply = self.model.invoke(&messages).await?;
            if !reply.has_tool_calls() {
                return Ok(ChainOutput {
                    answer: reply.content,
                    context: Vec::new(),
                    steps,
                });
            }

            let calls = reply.tool_calls.clone();
            if let Some(call) = calls.last() {
                last_tool = call.name.clone();
            }
            messages.push(reply.clone());
            steps.push(reply);

            for call in &calls {
                let result = self.call_tool(call).await;
                messages.push(result.clone());
                steps.push(result);
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "tool loop hit the iteration limit"
        );
        Err(ColloquyError::ToolExecution {
            tool_name: last_tool,
            message: format!(
                "no answer after {} tool iterations",
                self.max_iterations
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_results_are_not_requoted() {
        assert_eq!(render(json!("rows")), "rows");
        assert_eq!(render(json!({"error": "x"})), r#"{"error":"x"}"#);
    }
}
