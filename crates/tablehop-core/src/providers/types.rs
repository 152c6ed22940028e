//! Conversation types shared by the agent loop and the providers

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Who produced a history entry. The system prompt is passed to
/// [`LlmProvider::chat`] separately and never stored in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    /// Tool outputs fed back to the model
    Tool,
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatBlock {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult { tool_call_id: String, content: String },
}

impl ChatBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_call_id: call.id.clone(),
            content: content.into(),
        }
    }
}

/// One entry of a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub blocks: Vec<ChatBlock>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            blocks: vec![ChatBlock::text(text)],
        }
    }

    pub fn assistant(blocks: Vec<ChatBlock>) -> Self {
        Self {
            role: ChatRole::Assistant,
            blocks,
        }
    }

    pub fn tool_results(blocks: Vec<ChatBlock>) -> Self {
        Self {
            role: ChatRole::Tool,
            blocks,
        }
    }
}

/// Why the model ended its reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    /// Cut off by the token limit
    Length,
    Other(String),
}

impl FinishReason {
    /// Map an OpenAI-style `finish_reason`; a missing one means a normal stop
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("stop") => Self::Stop,
            Some("tool_calls") | Some("function_call") => Self::ToolCalls,
            Some("length") => Self::Length,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// One model reply
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub blocks: Vec<ChatBlock>,
    pub finish: FinishReason,
    pub usage: TokenUsage,
}

impl ChatResponse {
    pub fn text_reply(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![ChatBlock::text(text)],
            finish: FinishReason::Stop,
            usage: TokenUsage::default(),
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            blocks: vec![ChatBlock::ToolCall(call)],
            finish: FinishReason::ToolCalls,
            usage: TokenUsage::default(),
        }
    }

    /// Text blocks joined by newlines
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ChatBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.blocks.iter().filter_map(|b| match b {
            ChatBlock::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// The reply as it is recorded in history
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::assistant(self.blocks.clone())
    }
}

/// A chat-completions backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name for logs (e.g. "openai-compat")
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            input: json!({}),
        }
    }

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(FinishReason::parse(None), FinishReason::Stop);
        assert_eq!(FinishReason::parse(Some("stop")), FinishReason::Stop);
        assert_eq!(FinishReason::parse(Some("function_call")), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse(Some("length")), FinishReason::Length);
        assert_eq!(
            FinishReason::parse(Some("content_filter")),
            FinishReason::Other("content_filter".into())
        );
    }

    #[test]
    fn test_response_text_and_calls() {
        let resp = ChatResponse {
            blocks: vec![
                ChatBlock::text("Looking"),
                ChatBlock::ToolCall(call("search_restaurants")),
                ChatBlock::text("up"),
                ChatBlock::ToolCall(call("get_menu")),
            ],
            finish: FinishReason::ToolCalls,
            usage: TokenUsage {
                prompt_tokens: 7,
                completion_tokens: 5,
            },
        };
        assert_eq!(resp.text(), "Looking\nup");
        let names: Vec<&str> = resp.tool_calls().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["search_restaurants", "get_menu"]);
        assert_eq!(resp.usage.total(), 12);

        let msg = resp.to_message();
        assert_eq!(msg.role, ChatRole::Assistant);
        assert_eq!(msg.blocks, resp.blocks);
    }

    #[test]
    fn test_text_reply_has_no_calls() {
        let resp = ChatResponse::text_reply("Here you go");
        assert_eq!(resp.tool_calls().count(), 0);
        assert_eq!(resp.finish, FinishReason::Stop);
    }

    #[test]
    fn test_tool_result_links_call() {
        let call = call("place_order");
        let msg = ChatMessage::tool_results(vec![ChatBlock::tool_result(&call, "ok")]);
        assert_eq!(msg.role, ChatRole::Tool);
        assert_eq!(
            msg.blocks[0],
            ChatBlock::ToolResult {
                tool_call_id: "call_place_order".into(),
                content: "ok".into(),
            }
        );
    }

    #[test]
    fn test_block_serde_shape() {
        let v = serde_json::to_value(ChatBlock::ToolCall(call("get_menu"))).unwrap();
        assert_eq!(v["type"], "tool_call");
        assert_eq!(v["name"], "get_menu");
        let back: ChatBlock = serde_json::from_value(v).unwrap();
        assert!(matches!(back, ChatBlock::ToolCall(c) if c.id == "call_get_menu"));
    }
}
