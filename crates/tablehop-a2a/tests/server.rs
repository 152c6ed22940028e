//! End-to-end: a scripted agent behind the A2A server, driven over HTTP

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

use tablehop_a2a::protocol::{Message, TaskIdParams, TaskQueryParams, TaskSendParams};
use tablehop_a2a::{
    A2aCardResolver, A2aClient, A2aServer, AgentCapabilities, AgentCard, TaskEvent, TaskManager,
    TaskState,
};
use tablehop_chain::EthSigner;
use tablehop_core::{AgentContent, AgentEvent, AgentRuntime};

struct EchoAgent;

#[async_trait]
impl AgentRuntime for EchoAgent {
    fn supported_content_types(&self) -> Vec<String> {
        vec!["text".into(), "text/plain".into()]
    }

    async fn invoke(&self, query: &str, _session_id: &str) -> Result<AgentContent> {
        Ok(AgentContent::Text(format!("echo: {}", query)))
    }

    fn stream(&self, query: &str, _session_id: &str) -> BoxStream<'static, Result<AgentEvent>> {
        let reply = format!("echo: {}", query);
        futures::stream::iter(vec![
            Ok(AgentEvent::Working("Processing...".to_string())),
            Ok(AgentEvent::Complete(AgentContent::Text(reply))),
        ])
        .boxed()
    }
}

async fn start(verify_signatures: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let card = AgentCard {
        name: "Echo".into(),
        description: Some("Echoes the query".into()),
        url: url.clone(),
        provider: None,
        version: "1.0.0".into(),
        documentation_url: None,
        capabilities: AgentCapabilities {
            streaming: true,
            ..Default::default()
        },
        authentication: None,
        default_input_modes: vec!["text".into()],
        default_output_modes: vec!["text".into()],
        skills: vec![],
    };
    let manager =
        TaskManager::new(Arc::new(EchoAgent)).with_signature_verification(verify_signatures);
    tokio::spawn(A2aServer::new(card, manager).serve_listener(listener));
    url
}

fn params(id: &str, text: &str) -> TaskSendParams {
    TaskSendParams {
        id: id.into(),
        session_id: "11111111-1111-1111-1111-111111111111".into(),
        message: Message::user_text(text),
        accepted_output_modes: Some(vec!["text".into()]),
        push_notification: None,
        history_length: None,
        metadata: None,
    }
}

fn signed(mut params: TaskSendParams, signer: &EthSigner) -> TaskSendParams {
    let address = signer.address().to_checksum();
    let signature = signer
        .sign_message(&format!("{}{}", address, params.session_id))
        .unwrap();
    let mut meta = serde_json::Map::new();
    meta.insert("auth".into(), json!({"address": address, "signature": signature}));
    params.message.metadata = Some(meta);
    params
}

#[tokio::test]
async fn test_agent_card_discovery() {
    let url = start(false).await;
    let card = A2aCardResolver::new(url.as_str())
        .unwrap()
        .get_agent_card()
        .await
        .unwrap();
    assert_eq!(card.name, "Echo");
    assert!(card.capabilities.streaming);
    assert_eq!(card.url, url);
}

#[tokio::test]
async fn test_send_get_cancel() {
    let client = A2aClient::new(start(false).await).unwrap();

    let task = client.send_task(params("t1", "pizza")).await.unwrap();
    assert_eq!(task.status.state, TaskState::Completed);
    assert_eq!(
        task.artifacts.unwrap()[0].parts[0].as_text(),
        Some("echo: pizza")
    );

    let task = client
        .get_task(TaskQueryParams {
            id: "t1".into(),
            history_length: Some(5),
            metadata: None,
        })
        .await
        .unwrap();
    assert_eq!(task.history.unwrap().len(), 1);

    let err = client
        .cancel_task(TaskIdParams {
            id: "t1".into(),
            metadata: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("-32002"));

    let err = client
        .get_task(TaskQueryParams {
            id: "missing".into(),
            history_length: None,
            metadata: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("-32001"));
}

#[tokio::test]
async fn test_streaming_ends_with_one_final_event() {
    let client = A2aClient::new(start(false).await).unwrap();
    let events: Vec<TaskEvent> = client
        .send_task_streaming(params("t2", "sushi"))
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 4);
    assert!(events.last().unwrap().is_final());
    assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);
    assert!(matches!(events[2], TaskEvent::Artifact(_)));
}

#[tokio::test]
async fn test_signature_checks() {
    let url = start(true).await;
    let client = A2aClient::new(url.as_str()).unwrap();

    let err = client.send_task(params("t3", "tacos")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "A2A error -32603: Signature verification failed: \
         No authentication data found in message metadata"
    );

    let signer = EthSigner::random();
    let task = client
        .send_task(signed(params("t4", "tacos"), &signer))
        .await
        .unwrap();
    assert_eq!(task.status.state, TaskState::Completed);

    // signature over a different session
    let mut forged = signed(params("t5", "tacos"), &signer);
    forged.session_id = "22222222-2222-2222-2222-222222222222".into();
    let err = client.send_task(forged).await.unwrap_err();
    assert!(err.to_string().contains("Signature verification failed"));
}

#[tokio::test]
async fn test_streaming_rejection_is_error_event() {
    let client = A2aClient::new(start(true).await).unwrap();
    let mut events = client
        .send_task_streaming(params("t6", "curry"))
        .await
        .unwrap();
    let first = events.next().await.unwrap();
    assert!(first.unwrap_err().to_string().contains("-32603"));
}

#[tokio::test]
async fn test_raw_jsonrpc_errors() {
    let url = start(false).await;
    let http = reqwest::Client::new();

    let v: Value = http
        .post(&url)
        .body("not json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(v["error"]["code"], -32700);

    let v: Value = http
        .post(&url)
        .json(&json!({"jsonrpc": "2.0", "id": 3, "method": "tasks/resubscribe", "params": {}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(v["error"]["code"], -32004);
    assert_eq!(v["id"], 3);
}
