//! A2A (Agent-to-Agent) protocol support for tablehop
//!
//! Server side: a JSON-RPC task manager in front of any [`tablehop_core::AgentRuntime`],
//! with signature and on-chain confirmation checks. Client side: a card
//! resolver, a JSON-RPC/SSE client and the host agent that delegates to
//! remote agents.

pub mod client;
pub mod error;
pub mod host;
pub mod protocol;
pub mod server;
pub mod store;
pub mod task_manager;
pub mod tool;

pub use client::{A2aCardResolver, A2aClient, SseDecoder};
pub use error::A2aError;
pub use host::{DelegationResponse, HostAgent, HostSession, RemoteAgentConnection, RemoteAgentInfo};
pub use protocol::{AgentCapabilities, AgentCard, AgentSkill, Message, Part, Task, TaskEvent, TaskState};
pub use server::A2aServer;
pub use store::TaskStore;
pub use task_manager::TaskManager;
pub use tool::{host_tool_agent, register_host_tools};
