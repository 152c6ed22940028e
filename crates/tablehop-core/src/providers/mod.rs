//! LLM provider abstraction
//!
//! Agents talk to models through the [`LlmProvider`] trait. The only shipped
//! backend is [`OpenAiCompatProvider`], which speaks the `/chat/completions`
//! dialect understood by OpenAI, Gemini's OpenAI endpoint, Ollama and vLLM.

pub mod openai_compat;
pub mod types;

pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use types::{
    ChatBlock, ChatMessage, ChatResponse, ChatRole, FinishReason, LlmProvider, TokenUsage,
    ToolCall, ToolDefinition,
};
