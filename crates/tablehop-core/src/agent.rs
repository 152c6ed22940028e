//! Tool-calling agent loop
//!
//! [`AgentRuntime`] is what the A2A task manager drives. [`ToolAgent`] is the
//! stock implementation: it keeps per-session history, calls an
//! [`LlmProvider`], runs requested tools through a [`ToolRegistry`] and stops
//! when the model ends its turn or an escalating tool fires.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::providers::{ChatBlock, ChatMessage, FinishReason, LlmProvider};
use crate::tools::{ToolContext, ToolExecutor, ToolRegistry};

/// Marker an agent puts in its reply when it needs more input from the user
pub const MISSING_INFO_MARKER: &str = "MISSING_INFO:";

const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Final output of one agent turn
#[derive(Debug, Clone, PartialEq)]
pub enum AgentContent {
    Text(String),
    /// Structured output from an escalating tool (e.g. an order form)
    Data(Value),
}

impl AgentContent {
    /// Whether the caller must supply more information before the task can finish
    pub fn requires_input(&self) -> bool {
        match self {
            Self::Text(text) => text.contains(MISSING_INFO_MARKER),
            Self::Data(_) => true,
        }
    }
}

/// Item yielded by [`AgentRuntime::stream`]
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Progress update between tool rounds
    Working(String),
    /// The turn finished; always the last event
    Complete(AgentContent),
}

/// Anything the task manager can delegate a user query to
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Output content types the agent can produce
    fn supported_content_types(&self) -> Vec<String>;

    /// Run a full turn and return its final output
    async fn invoke(&self, query: &str, session_id: &str) -> Result<AgentContent>;

    /// Run a full turn, yielding progress events and then the final output
    fn stream(&self, query: &str, session_id: &str) -> BoxStream<'static, Result<AgentEvent>>;
}

/// Outcome of a single model round
enum Step {
    /// Tools ran, the model should see their results
    Continue,
    Done(AgentContent),
}

#[derive(Clone)]
struct Inner {
    name: String,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    processing_message: String,
    content_types: Vec<String>,
    max_iterations: usize,
    /// One lock per session, held for a whole turn
    sessions: DashMap<String, Arc<Mutex<Vec<ChatMessage>>>>,
}

/// LLM agent with a fixed tool set and per-session conversation memory
#[derive(Clone)]
pub struct ToolAgent {
    inner: Arc<Inner>,
}

impl ToolAgent {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                provider,
                tools,
                system_prompt: system_prompt.into(),
                processing_message: "Processing...".to_string(),
                content_types: vec!["text".to_string(), "text/plain".to_string()],
                max_iterations: DEFAULT_MAX_ITERATIONS,
                sessions: DashMap::new(),
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::make_mut(&mut self.inner)
    }

    pub fn with_processing_message(mut self, message: impl Into<String>) -> Self {
        self.inner_mut().processing_message = message.into();
        self
    }

    pub fn with_content_types(mut self, types: Vec<String>) -> Self {
        self.inner_mut().content_types = types;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.inner_mut().max_iterations = max.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of messages remembered for `session_id`
    pub async fn history_len(&self, session_id: &str) -> usize {
        let session = self.inner.sessions.get(session_id).map(|h| h.value().clone());
        match session {
            Some(history) => history.lock().await.len(),
            None => 0,
        }
    }
}

impl Inner {
    async fn step(&self, session_id: &str, history: &mut Vec<ChatMessage>) -> Result<Step> {
        let response = self
            .provider
            .chat(history, &self.tools.list_tools(), &self.system_prompt)
            .await?;

        history.push(response.to_message());
        if response.finish == FinishReason::Length {
            warn!("[{}] model reply was cut off by the token limit", self.name);
        }

        if response.tool_calls().next().is_none() {
            return Ok(Step::Done(AgentContent::Text(response.text())));
        }

        let ctx = ToolContext::new(session_id);
        let mut results = Vec::new();
        let mut escalated = None;

        for call in response.tool_calls() {
            let name = call.name.as_str();
            debug!("[{}] tool call {} ({})", self.name, name, call.id);

            let outcome = self.tools.execute(name, call.input.clone(), &ctx).await;
            let content = match outcome {
                Ok(output) => {
                    if escalated.is_none()
                        && self.tools.get(name).is_some_and(|t| t.escalates())
                    {
                        escalated = Some(output.clone());
                    }
                    output
                }
                Err(e) => format!("Error: {}", e),
            };
            results.push(ChatBlock::tool_result(call, content));
        }
        history.push(ChatMessage::tool_results(results));

        match escalated {
            Some(output) => {
                info!("[{}] tool escalated, ending turn", self.name);
                let content = serde_json::from_str::<Value>(&output)
                    .map(AgentContent::Data)
                    .unwrap_or(AgentContent::Text(output));
                Ok(Step::Done(content))
            }
            None => Ok(Step::Continue),
        }
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<Vec<ChatMessage>>> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn exhausted(&self) -> anyhow::Error {
        warn!(
            "[{}] gave up after {} tool rounds",
            self.name, self.max_iterations
        );
        anyhow!(
            "Agent did not finish within {} tool rounds",
            self.max_iterations
        )
    }
}

#[async_trait]
impl AgentRuntime for ToolAgent {
    fn supported_content_types(&self) -> Vec<String> {
        self.inner.content_types.clone()
    }

    async fn invoke(&self, query: &str, session_id: &str) -> Result<AgentContent> {
        let inner = &self.inner;
        let session = inner.session(session_id);
        let mut history = session.lock().await;
        history.push(ChatMessage::user(query));

        for _ in 0..inner.max_iterations {
            if let Step::Done(content) = inner.step(session_id, &mut history).await? {
                return Ok(content);
            }
        }
        Err(inner.exhausted())
    }

    fn stream(&self, query: &str, session_id: &str) -> BoxStream<'static, Result<AgentEvent>> {
        let inner = Arc::clone(&self.inner);
        let query = query.to_string();
        let session_id = session_id.to_string();

        Box::pin(async_stream::try_stream! {
            let mut history = inner.session(&session_id).lock_owned().await;
            history.push(ChatMessage::user(query));
            let mut finished = None;

            for _ in 0..inner.max_iterations {
                match inner.step(&session_id, &mut history).await? {
                    Step::Continue => yield AgentEvent::Working(inner.processing_message.clone()),
                    Step::Done(content) => {
                        finished = Some(content);
                        break;
                    }
                }
            }

            drop(history);
            let content = finished.ok_or_else(|| inner.exhausted())?;
            yield AgentEvent::Complete(content);
        })
    }
}
