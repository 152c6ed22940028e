//! Tool registry and executor system

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::providers::ToolDefinition;

/// Per-call context handed to tools by the agent loop
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Conversation the call belongs to
    pub session_id: String,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Trait for executing tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value, ctx: &ToolContext) -> Result<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// When true, a successful call ends the agent turn and its output goes
    /// back to the caller unsummarized.
    fn escalates(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<String>;
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<Arc<str>, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool handler
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name: Arc<str> = Arc::from(handler.name());
        debug!("Registering tool: {}", name);
        self.tools.insert(name, handler);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn definition(handler: &Arc<dyn ToolHandler>) -> ToolDefinition {
        ToolDefinition {
            name: handler.name().to_string(),
            description: handler.description().to_string(),
            input_schema: handler.input_schema(),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, input: Value, ctx: &ToolContext) -> Result<String> {
        debug!("Executing tool: {} with input: {:?}", tool_name, input);

        let handler = self
            .tools
            .get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        match handler.execute(input, ctx).await {
            Ok(result) => {
                debug!("Tool {} succeeded", tool_name);
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                Err(e)
            }
        }
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self.tools.values().map(Self::definition).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

/// Helper function to create a JSON schema for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Optional string argument; empty strings count as absent
pub fn opt_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Required string argument
pub fn req_str<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    opt_str(input, key).ok_or_else(|| anyhow!("Missing '{}' parameter", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyTool;

    #[async_trait]
    impl ToolHandler for DummyTool {
        fn name(&self) -> &str {
            "dummy"
        }

        fn description(&self) -> &str {
            "A dummy tool for testing"
        }

        fn input_schema(&self) -> Value {
            json_schema(
                serde_json::json!({
                    "message": {
                        "type": "string",
                        "description": "Test message"
                    }
                }),
                vec!["message"],
            )
        }

        async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<String> {
            Ok(format!("dummy result for {}", ctx.session_id))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolHandler for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> Value {
            json_schema(serde_json::json!({}), vec![])
        }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<String> {
            Err(anyhow!("intentional failure"))
        }
    }

    #[tokio::test]
    async fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool));

        assert_eq!(registry.len(), 1);

        let result = registry
            .execute(
                "dummy",
                serde_json::json!({"message": "test"}),
                &ToolContext::new("s1"),
            )
            .await;
        assert_eq!(result.unwrap(), "dummy result for s1");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute("nonexistent", serde_json::json!({}), &ToolContext::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_registry_execute_failing_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));

        let result = registry
            .execute("failing", serde_json::json!({}), &ToolContext::default())
            .await;
        assert!(result.unwrap_err().to_string().contains("intentional failure"));
    }

    #[test]
    fn test_registry_default() {
        let registry = ToolRegistry::default();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_list_tools_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        registry.register(Arc::new(DummyTool));

        let tools = registry.list_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "dummy");
        assert_eq!(tools[1].name, "failing");
        assert!(tools[0].input_schema.get("properties").is_some());
    }

    #[test]
    fn test_registry_overwrite() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool));
        registry.register(Arc::new(DummyTool));
        assert_eq!(registry.len(), 1);
        assert!(!registry.get("dummy").unwrap().escalates());
    }

    #[test]
    fn test_string_args() {
        let input = serde_json::json!({"a": " x ", "b": "", "c": 3});
        assert_eq!(opt_str(&input, "a"), Some("x"));
        assert_eq!(opt_str(&input, "b"), None);
        assert_eq!(opt_str(&input, "c"), None);
        assert!(req_str(&input, "missing").is_err());
    }

    #[test]
    fn test_json_schema_helper() {
        let schema = json_schema(
            serde_json::json!({
                "name": {"type": "string"},
                "age": {"type": "number"}
            }),
            vec!["name"],
        );
        assert_eq!(schema["type"], "object");
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "name");
    }
}
