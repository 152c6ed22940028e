//! OpenAI-compatible `/chat/completions` provider with function calling

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{
    ChatBlock, ChatMessage, ChatResponse, ChatRole, FinishReason, LlmProvider, TokenUsage,
    ToolCall, ToolDefinition,
};

/// Gemini's OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Configuration for an OpenAI-compatible endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiCompatConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: None,
            temperature: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Provider for OpenAI, Gemini (OpenAI mode), Ollama, vLLM and friends
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

// ── Wire format ──

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ── Conversion ──

fn to_wire_messages(messages: &[ChatMessage], system: &str) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        out.push(WireMessage::text("system", system));
    }

    for msg in messages {
        let mut text = Vec::new();
        let mut calls = Vec::new();
        for block in &msg.blocks {
            match block {
                ChatBlock::Text { text: t } => text.push(t.as_str()),
                ChatBlock::ToolCall(call) => calls.push(WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.input.to_string(),
                    },
                }),
                // one `tool` message per result
                ChatBlock::ToolResult {
                    tool_call_id,
                    content,
                } => out.push(WireMessage {
                    role: ChatRole::Tool.as_wire().to_string(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                }),
            }
        }

        if !text.is_empty() || !calls.is_empty() {
            out.push(WireMessage {
                role: msg.role.as_wire().to_string(),
                content: (!text.is_empty()).then(|| text.join("\n")),
                tool_calls: (!calls.is_empty()).then_some(calls),
                tool_call_id: None,
            });
        }
    }
    out
}

fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            kind: "function",
            function: WireFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

fn from_wire_response(resp: WireResponse) -> Result<ChatResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Response contained no choices"))?;

    let mut blocks = Vec::new();
    if let Some(text) = choice.message.content
        && !text.trim().is_empty()
    {
        blocks.push(ChatBlock::text(text));
    }

    for (i, call) in choice.message.tool_calls.unwrap_or_default().into_iter().enumerate() {
        let input = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                warn!(
                    "Unparseable arguments for tool {}: {}",
                    call.function.name, e
                );
                Value::Object(Default::default())
            })
        };
        let id = if call.id.is_empty() {
            format!("call_{}", i)
        } else {
            call.id
        };
        blocks.push(ChatBlock::ToolCall(ToolCall {
            id,
            name: call.function.name,
            input,
        }));
    }

    // Gemini reports "stop" even when it returns tool calls
    let has_calls = blocks.iter().any(|b| matches!(b, ChatBlock::ToolCall(_)));
    let finish = if has_calls {
        FinishReason::ToolCalls
    } else {
        FinishReason::parse(choice.finish_reason.as_deref())
    };

    let usage = resp.usage.unwrap_or_default();
    Ok(ChatResponse {
        blocks,
        finish,
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        },
    })
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        "openai-compat"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        let request = WireRequest {
            model: &self.config.model,
            messages: to_wire_messages(messages, system),
            tools: to_wire_tools(tools),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        debug!(
            "Sending {} messages with {} tools to {}",
            request.messages.len(),
            request.tools.len(),
            self.config.model
        );

        let mut req = self.client.post(self.endpoint()).json(&request);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.config.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM request failed (HTTP {}): {}", status, body));
        }

        let wire: WireResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;
        let resp = from_wire_response(wire)?;
        debug!(
            "Model replied: finish={:?}, {} tokens ({} prompt)",
            resp.finish,
            resp.usage.total(),
            resp.usage.prompt_tokens
        );
        Ok(resp)
    }
}

impl ChatRole {
    fn as_wire(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_messages_system_first() {
        let msgs = to_wire_messages(&[ChatMessage::user("pizza please")], "be helpful");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, ChatRole::User.as_wire());
        assert_eq!(msgs[1].content.as_deref(), Some("pizza please"));
    }

    #[test]
    fn test_wire_messages_tool_round() {
        let history = vec![
            ChatMessage::user("find tacos"),
            ChatMessage::assistant(vec![ChatBlock::ToolCall(ToolCall {
                id: "c1".to_string(),
                name: "search_restaurants".to_string(),
                input: json!({"cuisine": "mexican"}),
            })]),
            ChatMessage::tool_results(vec![ChatBlock::ToolResult {
                tool_call_id: "c1".to_string(),
                content: "[]".to_string(),
            }]),
        ];
        let msgs = to_wire_messages(&history, "");
        assert_eq!(msgs.len(), 3);

        assert_eq!(msgs[1].role, "assistant");
        assert!(msgs[1].content.is_none());
        let calls = msgs[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "search_restaurants");
        let args: Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args["cuisine"], "mexican");

        assert_eq!(msgs[2].role, "tool");
        assert_eq!(msgs[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_wire_request_shape() {
        let tools = vec![ToolDefinition {
            name: "place_order".to_string(),
            description: "Place an order".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        let request = WireRequest {
            model: "m",
            messages: vec![WireMessage::text("user", "hi")],
            tools: to_wire_tools(&tools),
            max_tokens: None,
            temperature: None,
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["tools"][0]["type"], "function");
        assert_eq!(v["tools"][0]["function"]["name"], "place_order");
        assert!(v.get("max_tokens").is_none());
        assert!(v["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn test_parse_text_response() {
        let wire: WireResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Here you go"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        }))
        .unwrap();
        let resp = from_wire_response(wire).unwrap();
        assert_eq!(resp.finish, FinishReason::Stop);
        assert_eq!(resp.text(), "Here you go");
        assert_eq!(resp.usage.total(), 13);
    }

    #[test]
    fn test_parse_tool_call_response() {
        let wire: WireResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "", "type": "function",
                         "function": {"name": "place_order", "arguments": "{\"order_id\":\"order_1\"}"}},
                        {"id": "x", "type": "function",
                         "function": {"name": "search_restaurants", "arguments": "not json"}}
                    ]
                },
                "finish_reason": "stop"
            }]
        }))
        .unwrap();
        let resp = from_wire_response(wire).unwrap();
        assert_eq!(resp.finish, FinishReason::ToolCalls);
        let calls: Vec<&ToolCall> = resp.tool_calls().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].input["order_id"], "order_1");
        assert_eq!(calls[1].id, "x");
        assert!(calls[1].input.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_parse_empty_choices() {
        let wire: WireResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(from_wire_response(wire).is_err());
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = OpenAiCompatConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let provider = OpenAiCompatProvider::new(OpenAiCompatConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let provider = OpenAiCompatProvider::new(OpenAiCompatConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        let result = provider.chat(&[ChatMessage::user("hi")], &[], "").await;
        assert!(result.is_err());
    }
}
