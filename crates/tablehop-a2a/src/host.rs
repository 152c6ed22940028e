//! Host agent: delegates user requests to remote A2A agents
//!
//! The host keeps one session per conversation. The session id is reused for
//! every task sent in that conversation, is signed for authentication and is
//! the source of the on-chain task uuid. A task left in `input-required` is
//! continued with the same task id on the next send.

use anyhow::{Context, Result, anyhow, bail};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use tablehop_chain::{EthSigner, EvmAddress, TaskLedger, TaskUuid};

use crate::client::{A2aCardResolver, A2aClient};
use crate::protocol::{
    AgentCard, Message, Part, Role, Task, TaskEvent, TaskSendParams, TaskState, TaskStatus,
};

/// Output modes the host can render
const ACCEPTED_OUTPUT_MODES: [&str; 3] = ["text", "text/plain", "image/png"];

/// A known remote agent
pub struct RemoteAgentConnection {
    card: AgentCard,
    client: A2aClient,
    /// Account the agent is paid on, used as the `confirmTask` service agent
    address: Option<EvmAddress>,
}

impl RemoteAgentConnection {
    pub fn new(card: AgentCard, address: Option<EvmAddress>) -> Result<Self> {
        let client = A2aClient::from_card(&card)?;
        Ok(Self {
            card,
            client,
            address,
        })
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    pub fn address(&self) -> Option<EvmAddress> {
        self.address
    }

    /// Send a task, streaming when the agent supports it
    pub async fn send_task(&self, params: TaskSendParams) -> Result<Task> {
        if !self.card.capabilities.streaming {
            return self.client.send_task(params).await;
        }

        let mut task = Task {
            id: params.id.clone(),
            session_id: Some(params.session_id.clone()),
            status: TaskStatus::new(TaskState::Submitted, None),
            artifacts: None,
            history: None,
            metadata: None,
        };
        let mut events = self.client.send_task_streaming(params).await?;
        while let Some(event) = events.next().await {
            apply_event(&mut task, event?);
        }
        Ok(task)
    }
}

/// Fold a streamed event into the task snapshot.
///
/// A status without a message keeps the previous one, so the closing
/// `final` event does not erase the agent's reply.
fn apply_event(task: &mut Task, event: TaskEvent) {
    match event {
        TaskEvent::Status(ev) => {
            debug!("Task {} -> {}", task.id, ev.status.state);
            let previous = task.status.message.take();
            task.status = ev.status;
            if task.status.message.is_none() {
                task.status.message = previous;
            }
        }
        TaskEvent::Artifact(ev) => {
            task.artifacts.get_or_insert_with(Vec::new).push(ev.artifact);
        }
    }
}

/// Per-conversation delegation state
#[derive(Debug, Clone)]
pub struct HostSession {
    pub session_id: String,
    /// Pending task awaiting user input
    pub task_id: Option<String>,
    /// Agent the conversation is talking to
    pub agent: Option<String>,
    pub active: bool,
}

impl HostSession {
    fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            task_id: None,
            agent: None,
            active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteAgentInfo {
    pub name: String,
    pub description: Option<String>,
}

/// What a delegated task produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegationResponse {
    pub agent: String,
    pub task_id: String,
    pub state: TaskState,
    /// The remote agent is waiting on the user; relay the reply verbatim
    pub input_required: bool,
    pub session_active: bool,
    pub parts: Vec<Value>,
    /// `confirmTask` transaction, when the task was anchored on chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_task_tx: Option<String>,
}

impl DelegationResponse {
    /// Text parts joined, other parts as compact JSON
    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Convert parts to plain values. File parts become a reference by name.
///
/// Returns the values and whether any part needs the user's attention.
pub fn convert_parts(parts: &[Part]) -> (Vec<Value>, bool) {
    let mut escalate = false;
    let values = parts
        .iter()
        .map(|part| match part {
            Part::Text { text, .. } => Value::String(text.clone()),
            Part::Data { data, .. } => data.clone(),
            Part::File { file, .. } => {
                escalate = true;
                json!({ "artifact-file-id": file.name })
            }
        })
        .collect();
    (values, escalate)
}

pub struct HostAgent {
    connections: DashMap<String, Arc<RemoteAgentConnection>>,
    sessions: DashMap<String, HostSession>,
    signer: Option<EthSigner>,
    ledger: Option<Arc<dyn TaskLedger>>,
    bounty_wei: u128,
}

impl Default for HostAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAgent {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            sessions: DashMap::new(),
            signer: None,
            ledger: None,
            bounty_wei: 0,
        }
    }

    /// Sign outgoing tasks with this key
    pub fn with_signer(mut self, signer: EthSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Anchor tasks on chain through `ledger`, paying `bounty_wei` each
    pub fn with_ledger(mut self, ledger: Arc<dyn TaskLedger>, bounty_wei: u128) -> Self {
        self.ledger = Some(ledger);
        self.bounty_wei = bounty_wei;
        self
    }

    pub fn address(&self) -> Option<EvmAddress> {
        self.signer.as_ref().map(EthSigner::address)
    }

    /// Resolve the card at `url` and register the agent
    pub async fn connect(&self, url: &str, address: Option<EvmAddress>) -> Result<AgentCard> {
        let card = A2aCardResolver::new(url)?
            .get_agent_card()
            .await
            .with_context(|| format!("Failed to resolve agent card at {}", url))?;
        self.register_agent_card(card.clone(), address)?;
        Ok(card)
    }

    pub fn register_agent_card(&self, card: AgentCard, address: Option<EvmAddress>) -> Result<()> {
        info!("Registered remote agent '{}' at {}", card.name, card.url);
        let name = card.name.clone();
        let connection = RemoteAgentConnection::new(card, address)?;
        self.connections.insert(name, Arc::new(connection));
        Ok(())
    }

    pub fn list_remote_agents(&self) -> Vec<RemoteAgentInfo> {
        let mut agents: Vec<RemoteAgentInfo> = self
            .connections
            .iter()
            .map(|c| RemoteAgentInfo {
                name: c.card.name.clone(),
                description: c.card.description.clone(),
            })
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    /// Session for a conversation, created on first use
    pub fn session(&self, conversation_id: &str) -> HostSession {
        self.sessions
            .entry(conversation_id.to_string())
            .or_insert_with(HostSession::new)
            .clone()
    }

    /// Agent the conversation is still talking to, if any
    pub fn active_agent(&self, conversation_id: &str) -> Option<String> {
        self.sessions
            .get(conversation_id)
            .filter(|s| s.active)
            .and_then(|s| s.agent.clone())
    }

    fn connection(&self, agent_name: &str) -> Result<Arc<RemoteAgentConnection>> {
        self.connections
            .get(agent_name)
            .map(|c| c.value().clone())
            .ok_or_else(|| anyhow!("Agent {} not found", agent_name))
    }

    fn auth_metadata(&self, session_id: &str) -> Option<Value> {
        let signer = self.signer.as_ref()?;
        let address = signer.address().to_checksum();
        match signer.sign_message(&format!("{}{}", address, session_id)) {
            Ok(signature) => Some(json!({ "address": address, "signature": signature })),
            Err(e) => {
                warn!("Error signing message: {}", e);
                None
            }
        }
    }

    /// Send `message` to `agent_name` within the conversation
    pub async fn send_task(
        &self,
        conversation_id: &str,
        agent_name: &str,
        message: &str,
    ) -> Result<DelegationResponse> {
        self.send(conversation_id, agent_name, message, None).await
    }

    /// Anchor the task on chain, then send it with the confirmation attached.
    ///
    /// Any on-chain failure falls back to a plain [`HostAgent::send_task`].
    pub async fn confirm_task(
        &self,
        conversation_id: &str,
        agent_name: &str,
        message: &str,
    ) -> Result<DelegationResponse> {
        match self.anchor_task(conversation_id, agent_name).await {
            Ok(tx_hash) => {
                let blockchain = json!({ "confirmTask": { "tx_hash": tx_hash } });
                self.send(conversation_id, agent_name, message, Some(blockchain))
                    .await
            }
            Err(e) => {
                warn!("On-chain task confirmation skipped: {:#}", e);
                self.send_task(conversation_id, agent_name, message).await
            }
        }
    }

    async fn anchor_task(&self, conversation_id: &str, agent_name: &str) -> Result<String> {
        let ledger = self
            .ledger
            .as_ref()
            .ok_or_else(|| anyhow!("no blockchain configured"))?;
        let connection = self.connection(agent_name)?;
        let service_agent = connection
            .address()
            .ok_or_else(|| anyhow!("no ethereum address known for agent {}", agent_name))?;

        let session_id = self.session(conversation_id).session_id;
        let uuid = TaskUuid::from_session_id(&session_id)?;
        let receipt = ledger
            .confirm_task(&uuid, &service_agent, self.bounty_wei)
            .await?;
        info!(
            "Task {} confirmed on chain for {} in {}",
            uuid, agent_name, receipt.transaction_hash
        );
        Ok(receipt.transaction_hash)
    }

    async fn send(
        &self,
        conversation_id: &str,
        agent_name: &str,
        message: &str,
        blockchain: Option<Value>,
    ) -> Result<DelegationResponse> {
        let connection = self.connection(agent_name)?;
        let session = self.session(conversation_id);
        let task_id = session
            .task_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let confirm_task_tx = blockchain
            .as_ref()
            .and_then(|b| b["confirmTask"]["tx_hash"].as_str())
            .map(str::to_string);

        let mut metadata = Map::new();
        metadata.insert("conversation_id".into(), json!(session.session_id));
        metadata.insert("message_id".into(), json!(uuid::Uuid::new_v4().to_string()));
        if let Some(auth) = self.auth_metadata(&session.session_id) {
            metadata.insert("auth".into(), auth);
        }
        if let Some(blockchain) = blockchain {
            metadata.insert("blockchain".into(), blockchain);
        }

        let mut task_metadata = Map::new();
        task_metadata.insert("conversation_id".into(), json!(session.session_id));

        let params = TaskSendParams {
            id: task_id.clone(),
            session_id: session.session_id.clone(),
            message: Message {
                role: Role::User,
                parts: vec![Part::text(message)],
                metadata: Some(metadata),
            },
            accepted_output_modes: Some(ACCEPTED_OUTPUT_MODES.iter().map(|m| m.to_string()).collect()),
            push_notification: None,
            history_length: None,
            metadata: Some(task_metadata),
        };

        debug!("Sending task {} to {}", task_id, agent_name);
        let task = connection.send_task(params).await?;
        let state = task.status.state;
        let session_active = !state.is_terminal();

        if let Some(mut entry) = self.sessions.get_mut(conversation_id) {
            entry.agent = Some(agent_name.to_string());
            entry.active = session_active;
            entry.task_id = (state == TaskState::InputRequired).then(|| task.id.clone());
        }

        match state {
            TaskState::Canceled => bail!("Agent {} task {} is cancelled", agent_name, task.id),
            TaskState::Failed => bail!("Agent {} task {} failed", agent_name, task.id),
            _ => {}
        }

        let mut parts = Vec::new();
        let mut escalate = state == TaskState::InputRequired;
        if let Some(message) = &task.status.message {
            let (values, files) = convert_parts(&message.parts);
            parts.extend(values);
            escalate |= files;
        }
        for artifact in task.artifacts.iter().flatten() {
            let (values, files) = convert_parts(&artifact.parts);
            parts.extend(values);
            escalate |= files;
        }

        info!("Agent {} task {} is {}", agent_name, task.id, state);
        Ok(DelegationResponse {
            agent: agent_name.to_string(),
            task_id: task.id,
            state,
            input_required: escalate,
            session_active,
            parts,
            confirm_task_tx,
        })
    }
}
