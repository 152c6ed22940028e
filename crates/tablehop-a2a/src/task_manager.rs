//! Task lifecycle: request validation, agent invocation, store updates
//!
//! Every send goes through the same gate: output modes, the text query,
//! the host's signature, then the optional on-chain confirmation. Only a
//! request that passes all four reaches the agent.

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use tablehop_chain::{AuthAssertion, ChainVerifier, verify_auth};
use tablehop_core::{AgentContent, AgentEvent, AgentRuntime};

use crate::error::A2aError;
use crate::protocol::{
    Artifact, Message, Part, Task, TaskArtifactUpdateEvent, TaskEvent, TaskIdParams,
    TaskQueryParams, TaskSendParams, TaskState, TaskStatus, TaskStatusUpdateEvent,
    are_modalities_compatible,
};
use crate::store::TaskStore;

const STREAM_FAILURE_MESSAGE: &str = "An error occurred while streaming the response";

pub struct TaskManager {
    store: Arc<TaskStore>,
    agent: Arc<dyn AgentRuntime>,
    verify_signatures: bool,
    chain: Option<Arc<ChainVerifier>>,
}

impl TaskManager {
    /// Manager with signature checks on and chain checks off
    pub fn new(agent: Arc<dyn AgentRuntime>) -> Self {
        Self {
            store: Arc::new(TaskStore::new()),
            agent,
            verify_signatures: true,
            chain: None,
        }
    }

    pub fn with_signature_verification(mut self, enabled: bool) -> Self {
        self.verify_signatures = enabled;
        self
    }

    pub fn with_chain_verifier(mut self, verifier: ChainVerifier) -> Self {
        self.chain = Some(Arc::new(verifier));
        self
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    fn user_query(params: &TaskSendParams) -> Result<String, A2aError> {
        params
            .message
            .parts
            .first()
            .and_then(Part::as_text)
            .map(str::to_string)
            .ok_or_else(|| A2aError::InvalidParams("Only text parts are supported".to_string()))
    }

    async fn validate(&self, params: &TaskSendParams) -> Result<String, A2aError> {
        let supported = self.agent.supported_content_types();
        if !are_modalities_compatible(&supported, params.accepted_output_modes.as_deref()) {
            warn!(
                "Unsupported output mode. Received {:?}, support {:?}",
                params.accepted_output_modes, supported
            );
            return Err(A2aError::IncompatibleContentTypes);
        }

        let query = Self::user_query(params)?;

        if self.verify_signatures {
            let auth: Option<AuthAssertion> = params
                .message
                .meta("auth")
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            verify_auth(auth.as_ref(), &params.session_id).map_err(|e| {
                warn!("Signature validation failed: {}", e);
                A2aError::Authentication(e)
            })?;
        }

        if let (Some(chain), Some(blockchain)) = (&self.chain, params.message.meta("blockchain")) {
            let tx_hash = blockchain
                .get("confirmTask")
                .and_then(|c| c.get("tx_hash"))
                .and_then(Value::as_str);
            chain
                .verify(&params.session_id, tx_hash)
                .await
                .map_err(|e| {
                    warn!("Blockchain confirmation validation failed: {}", e);
                    A2aError::ChainConfirmation(e)
                })?;
        }

        Ok(query)
    }

    /// `tasks/send`: run the agent to the end of its turn
    pub async fn on_send_task(&self, params: TaskSendParams) -> Result<Task, A2aError> {
        let query = self.validate(&params).await?;
        self.store.upsert(&params);
        self.store
            .update_status(&params.id, TaskStatus::new(TaskState::Working, None), None)?;

        match self.agent.invoke(&query, &params.session_id).await {
            Ok(content) => {
                let (state, parts) = content_to_parts(content);
                info!("Task {} finished as {}", params.id, state);
                self.store.update_status(
                    &params.id,
                    TaskStatus::new(state, Some(Message::agent(parts.clone()))),
                    Some(vec![Artifact::from_parts(parts)]),
                )
            }
            Err(e) => {
                error!("Error invoking agent for task {}: {:#}", params.id, e);
                let message = Message::agent(vec![Part::text(format!("Error invoking agent: {}", e))]);
                self.store
                    .update_status(&params.id, TaskStatus::new(TaskState::Failed, Some(message)), None)
            }
        }
    }

    /// `tasks/sendSubscribe`: validate, then stream status and artifact events.
    ///
    /// The stream always ends with exactly one `final` status event.
    pub async fn on_send_task_subscribe(
        &self,
        params: TaskSendParams,
    ) -> Result<BoxStream<'static, TaskEvent>, A2aError> {
        let query = self.validate(&params).await?;
        self.store.upsert(&params);

        let store = self.store.clone();
        let mut events = self.agent.stream(&query, &params.session_id);
        let task_id = params.id;

        let stream = async_stream::stream! {
            let mut finished = false;
            while let Some(item) = events.next().await {
                match item {
                    Ok(AgentEvent::Working(update)) => {
                        let status = TaskStatus::new(
                            TaskState::Working,
                            Some(Message::agent(vec![Part::text(update)])),
                        );
                        if let Err(e) = store.update_status(&task_id, status.clone(), None) {
                            warn!("Dropping update for task {}: {}", task_id, e);
                        }
                        yield status_event(&task_id, status, false);
                    }
                    Ok(AgentEvent::Complete(content)) => {
                        let (state, parts) = content_to_parts(content);
                        let artifact = Artifact::from_parts(parts.clone());
                        let status = TaskStatus::new(state, Some(Message::agent(parts)));
                        if let Err(e) =
                            store.update_status(&task_id, status.clone(), Some(vec![artifact.clone()]))
                        {
                            warn!("Dropping result for task {}: {}", task_id, e);
                        }
                        yield status_event(&task_id, status, false);
                        yield TaskEvent::Artifact(TaskArtifactUpdateEvent {
                            id: task_id.clone(),
                            artifact,
                            metadata: None,
                        });
                        yield status_event(&task_id, TaskStatus::new(state, None), true);
                        finished = true;
                        break;
                    }
                    Err(e) => {
                        error!("An error occurred while streaming task {}: {:#}", task_id, e);
                        break;
                    }
                }
            }

            if !finished {
                let status = TaskStatus::new(
                    TaskState::Failed,
                    Some(Message::agent(vec![Part::text(STREAM_FAILURE_MESSAGE)])),
                );
                if let Err(e) = store.update_status(&task_id, status.clone(), None) {
                    warn!("Dropping failure for task {}: {}", task_id, e);
                }
                yield status_event(&task_id, status, true);
            }
            debug!("Stream for task {} closed", task_id);
        };

        Ok(stream.boxed())
    }

    /// `tasks/get`
    pub fn on_get_task(&self, params: TaskQueryParams) -> Result<Task, A2aError> {
        debug!("Getting task {}", params.id);
        self.store.get_with_history(&params.id, params.history_length)
    }

    /// `tasks/cancel`. Known tasks still cannot be canceled.
    pub fn on_cancel_task(&self, params: TaskIdParams) -> Result<Task, A2aError> {
        if self.store.contains(&params.id) {
            Err(A2aError::TaskNotCancelable(params.id))
        } else {
            Err(A2aError::TaskNotFound(params.id))
        }
    }

    pub fn on_set_push_notification(&self, _params: Value) -> Result<Value, A2aError> {
        Err(A2aError::PushNotificationNotSupported)
    }

    pub fn on_get_push_notification(&self, _params: Value) -> Result<Value, A2aError> {
        Err(A2aError::PushNotificationNotSupported)
    }

    pub fn on_resubscribe(&self, _params: Value) -> Result<Value, A2aError> {
        Err(A2aError::UnsupportedOperation)
    }
}

fn status_event(task_id: &str, status: TaskStatus, is_final: bool) -> TaskEvent {
    TaskEvent::Status(TaskStatusUpdateEvent {
        id: task_id.to_string(),
        status,
        is_final,
        metadata: None,
    })
}

/// Final state and message parts for an agent's output
fn content_to_parts(content: AgentContent) -> (TaskState, Vec<Part>) {
    let state = if content.requires_input() {
        TaskState::InputRequired
    } else {
        TaskState::Completed
    };
    let part = match content {
        AgentContent::Text(text) => Part::text(text),
        AgentContent::Data(data) => Part::data(data),
    };
    (state, vec![part])
}
