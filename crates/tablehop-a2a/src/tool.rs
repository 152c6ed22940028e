//! Host-side tools: let an LLM discover remote agents and delegate to them

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use tablehop_core::tools::{ToolContext, ToolHandler, ToolRegistry, json_schema, req_str};
use tablehop_core::{LlmProvider, ToolAgent};

use crate::host::HostAgent;

pub const HOST_AGENT_NAME: &str = "host_agent";

const HOST_INSTRUCTION: &str = "\
You are an expert delegator that can delegate the user request to the \
appropriate remote agents.

Discovery:
- Use list_remote_agents to list the remote agents you can delegate to, and \
the agent this conversation is currently talking to.

Execution:
- For actionable tasks, use send_task to assign the task to a remote agent.
- When the user has agreed to pay for a task on chain, use confirm_task \
instead; it anchors the task before sending it.
- Be sure to include the remote agent name when you respond to the user.
- When a reply has input_required set, show the agent's reply to the user \
as is and wait for their answer.

Rely on tools to address the request and do not make up a response. If you \
are not sure, ask the user for more details. Focus on the most recent parts \
of the conversation. If there is an active agent, send the request to that \
agent.";

fn delegation_schema() -> Value {
    json_schema(
        json!({
            "agent_name": {
                "type": "string",
                "description": "Name of the remote agent, as listed by list_remote_agents"
            },
            "message": {
                "type": "string",
                "description": "Message to send to the agent"
            }
        }),
        vec!["agent_name", "message"],
    )
}

// ── list_remote_agents ──

pub struct ListRemoteAgentsTool {
    host: Arc<HostAgent>,
}

impl ListRemoteAgentsTool {
    pub fn new(host: Arc<HostAgent>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ToolHandler for ListRemoteAgentsTool {
    fn name(&self) -> &str {
        "list_remote_agents"
    }

    fn description(&self) -> &str {
        "List the available remote agents you can use to delegate the task."
    }

    fn input_schema(&self) -> Value {
        json_schema(json!({}), vec![])
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<String> {
        Ok(serde_json::to_string(&json!({
            "agents": self.host.list_remote_agents(),
            "active_agent": self.host.active_agent(&ctx.session_id),
        }))?)
    }
}

// ── send_task ──

pub struct SendTaskTool {
    host: Arc<HostAgent>,
}

impl SendTaskTool {
    pub fn new(host: Arc<HostAgent>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ToolHandler for SendTaskTool {
    fn name(&self) -> &str {
        "send_task"
    }

    fn description(&self) -> &str {
        "Send a message to a remote agent, starting a task or continuing the \
         one waiting for input."
    }

    fn input_schema(&self) -> Value {
        delegation_schema()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<String> {
        let agent = req_str(&input, "agent_name")?;
        let message = req_str(&input, "message")?;
        debug!("Delegating to {} in conversation {}", agent, ctx.session_id);
        let response = self.host.send_task(&ctx.session_id, agent, message).await?;
        Ok(serde_json::to_string(&response)?)
    }
}

// ── confirm_task ──

pub struct ConfirmTaskTool {
    host: Arc<HostAgent>,
}

impl ConfirmTaskTool {
    pub fn new(host: Arc<HostAgent>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ToolHandler for ConfirmTaskTool {
    fn name(&self) -> &str {
        "confirm_task"
    }

    fn description(&self) -> &str {
        "Register the task on chain with a bounty for the remote agent, then \
         send the message. Falls back to a plain send when the chain is unavailable."
    }

    fn input_schema(&self) -> Value {
        delegation_schema()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<String> {
        let agent = req_str(&input, "agent_name")?;
        let message = req_str(&input, "message")?;
        let response = self.host.confirm_task(&ctx.session_id, agent, message).await?;
        Ok(serde_json::to_string(&response)?)
    }
}

pub fn register_host_tools(registry: &mut ToolRegistry, host: Arc<HostAgent>) {
    registry.register(Arc::new(ListRemoteAgentsTool::new(host.clone())));
    registry.register(Arc::new(SendTaskTool::new(host.clone())));
    registry.register(Arc::new(ConfirmTaskTool::new(host)));
}

/// LLM-driven host agent. Each conversation id is its own host session.
pub fn host_tool_agent(host: Arc<HostAgent>, provider: Arc<dyn LlmProvider>) -> ToolAgent {
    let mut registry = ToolRegistry::new();
    register_host_tools(&mut registry, host);
    ToolAgent::new(HOST_AGENT_NAME, provider, Arc::new(registry), HOST_INSTRUCTION)
}
