//! Tool Registry: list bound tool definitions, execute one under a deadline (§4.12, §6).
//!
//! The registry is the seam the agent loop talks to; what tools are actually bound (the
//! persona's calculator, an HTTP fetcher, or an external collaborator's RAG search tool) is a
//! deployment concern, not a core one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cloudllm::client_wrapper::ToolDefinition;
use crate::cloudllm::tools::{Calculator, HttpClient};

/// Error surfaced by a failed or overrun tool execution. The agent loop turns this into a
/// `ToolCall{status:error}` event with `result = "Error: <msg>"`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool deadline exceeded")]
    Timeout,
    #[error("{0}")]
    Failed(String),
}

/// A single executable tool: its definition plus the async closure that runs it.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn call(&self, args: Value) -> Result<String, String>;
}

/// `list()`/`execute()` surface the agent loop depends on (§6 "Tool registry").
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn list(&self) -> Vec<ToolDefinition>;
    async fn execute(&self, name: &str, args: Value, deadline: Duration) -> Result<String, ToolError>;
}

/// Simple in-process registry over a fixed set of bound [`Tool`]s.
pub struct StaticToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl StaticToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|t| (t.definition().name.clone(), t))
            .collect();
        Self { tools }
    }

    /// The default built-in toolset: a calculator and an HTTP fetcher. Deployments bind
    /// additional tools (e.g. the out-of-scope RAG search tool) the same way, by constructing a
    /// registry over a larger `Vec<Arc<dyn Tool>>`.
    pub fn with_default_tools() -> Self {
        Self::new(vec![
            Arc::new(CalculatorTool::new()),
            Arc::new(HttpGetTool::new()),
        ])
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    async fn execute(&self, name: &str, args: Value, deadline: Duration) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?
            .clone();
        match tokio::time::timeout(deadline, tool.call(args)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(msg)) => Err(ToolError::Failed(msg)),
            Err(_elapsed) => Err(ToolError::Timeout),
        }
    }
}

/// Scientific calculator, bound to the `expression` argument.
pub struct CalculatorTool {
    calculator: Calculator,
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            calculator: Calculator::new(),
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculator".to_string(),
            description: "Evaluates a mathematical expression and returns the numeric result."
                .to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "expression": {"type": "string", "description": "The expression to evaluate"}
                },
                "required": ["expression"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<String, String> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required argument \"expression\"".to_string())?;
        self.calculator
            .evaluate(expression)
            .await
            .map(|value| value.to_string())
            .map_err(|e| e.to_string())
    }
}

/// Minimal HTTP GET fetcher, bound to the `url` argument.
pub struct HttpGetTool {
    client: HttpClient,
}

impl HttpGetTool {
    pub fn new() -> Self {
        Self {
            client: HttpClient::new(),
        }
    }
}

impl Default for HttpGetTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "http_get".to_string(),
            description: "Fetches a URL over HTTP GET and returns the response body.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The URL to fetch"}
                },
                "required": ["url"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<String, String> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required argument \"url\"".to_string())?;
        self.client
            .get(url)
            .await
            .map(|resp| resp.body)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calculator_tool_evaluates_expression() {
        let registry = StaticToolRegistry::with_default_tools();
        let result = registry
            .execute(
                "calculator",
                serde_json::json!({"expression": "2 + 2"}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result, "4");
    }

    #[tokio::test]
    async fn unknown_tool_name_is_an_error() {
        let registry = StaticToolRegistry::with_default_tools();
        let result = registry
            .execute("nonexistent", serde_json::json!({}), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ToolError::UnknownTool(_))));
    }
}
