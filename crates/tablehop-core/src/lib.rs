//! tablehop-core: tool registry, LLM providers, the tool-calling agent loop
//! and the Bay Area food-ordering agent.

pub mod agent;
pub mod food;
pub mod providers;
pub mod tools;

pub use agent::{AgentContent, AgentEvent, AgentRuntime, MISSING_INFO_MARKER, ToolAgent};
pub use providers::{LlmProvider, OpenAiCompatConfig, OpenAiCompatProvider};
pub use tools::{ToolContext, ToolExecutor, ToolHandler, ToolRegistry};
