//! A2A client: agent card discovery and JSON-RPC task calls

use anyhow::{Context, Result, anyhow, bail};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::protocol::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget for one task call, blocking or streamed; a remote agent may run
/// several LLM rounds
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Fetches an agent card from `<base>/.well-known/agent.json`
#[derive(Clone)]
pub struct A2aCardResolver {
    http: Client,
    base_url: String,
}

impl A2aCardResolver {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into(),
        })
    }

    pub async fn get_agent_card(&self) -> Result<AgentCard> {
        let url = format!(
            "{}/.well-known/agent.json",
            self.base_url.trim_end_matches('/')
        );
        debug!("Fetching agent card from {}", url);

        let resp = self
            .http
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Failed to connect to agent at {}", url))?;

        if !resp.status().is_success() {
            bail!("Agent card request failed: HTTP {}", resp.status());
        }

        let card: AgentCard = resp.json().await.context("Failed to parse agent card")?;
        info!(
            "Fetched agent card: {} (streaming: {})",
            card.name, card.capabilities.streaming
        );
        Ok(card)
    }
}

/// JSON-RPC client bound to one agent endpoint
#[derive(Clone)]
pub struct A2aClient {
    http: Client,
    url: String,
    timeout: Duration,
}

impl A2aClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            url: url.into(),
            timeout: REQUEST_TIMEOUT,
        })
    }

    /// Overall budget for each call, including every event of a stream
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Client for the endpoint a card advertises
    pub fn from_card(card: &AgentCard) -> Result<Self> {
        Self::new(card.url.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = JsonRpcRequest::new(method, params);
        debug!("Calling {} on {}", method, self.url);

        let resp = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to call {} at {}", method, self.url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("{} failed: HTTP {}: {}", method, status, body);
        }

        let response: JsonRpcResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;
        decode_result(response)
    }

    pub async fn send_task(&self, params: TaskSendParams) -> Result<Task> {
        self.rpc(methods::SEND_TASK, serde_json::to_value(params)?)
            .await
    }

    /// Send a task and receive its events as they happen.
    ///
    /// The stream ends after the first `final` status event. The whole
    /// exchange shares one deadline; keep-alive comments do not extend it.
    pub async fn send_task_streaming(
        &self,
        params: TaskSendParams,
    ) -> Result<BoxStream<'static, Result<TaskEvent>>> {
        let request = JsonRpcRequest::new(methods::SEND_TASK_SUBSCRIBE, serde_json::to_value(params)?);
        debug!("Opening task stream on {}", self.url);

        let deadline = Instant::now() + self.timeout;
        let budget = self.timeout;

        let pending = self
            .http
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .json(&request)
            .send();
        let resp = timeout_at(deadline, pending)
            .await
            .map_err(|_| anyhow!("Task stream at {} timed out after {:?}", self.url, budget))?
            .with_context(|| format!("Failed to open task stream at {}", self.url))?;

        if !resp.status().is_success() {
            bail!("Task stream request failed: HTTP {}", resp.status());
        }

        let mut chunks = resp.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut decoder = SseDecoder::default();
            'read: loop {
                let next = timeout_at(deadline, chunks.next())
                    .await
                    .map_err(|_| anyhow!("Task stream timed out after {:?}", budget))?;
                let chunk = match next {
                    Some(chunk) => chunk,
                    None => break,
                };
                let chunk = chunk.context("Task stream interrupted")?;
                for data in decoder.push(&chunk) {
                    let response: JsonRpcResponse = serde_json::from_str(&data)
                        .context("Malformed task stream event")?;
                    let event: TaskEvent = decode_result(response)?;
                    let done = event.is_final();
                    yield event;
                    if done {
                        break 'read;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }

    pub async fn get_task(&self, params: TaskQueryParams) -> Result<Task> {
        self.rpc(methods::GET_TASK, serde_json::to_value(params)?)
            .await
    }

    pub async fn cancel_task(&self, params: TaskIdParams) -> Result<Task> {
        self.rpc(methods::CANCEL_TASK, serde_json::to_value(params)?)
            .await
    }
}

fn decode_result<T: DeserializeOwned>(response: JsonRpcResponse) -> Result<T> {
    if let Some(err) = response.error {
        return Err(anyhow!("A2A error {}: {}", err.code, err.message));
    }
    let result = response
        .result
        .ok_or_else(|| anyhow!("JSON-RPC response carried neither result nor error"))?;
    serde_json::from_value(result).context("Unexpected JSON-RPC result shape")
}

/// Incremental `text/event-stream` parser yielding each event's `data`
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the data of every event completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_sse_decoder_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        let events = decoder.push(b"\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn test_sse_decoder_crlf_comments_and_multiline() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\r\n\r\nevent: x\r\ndata: one\r\ndata: two\r\n\r\ndata:three\n\n");
        assert_eq!(events, vec!["one\ntwo".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_decode_result_error() {
        let response = JsonRpcResponse::err(
            json!(1),
            JsonRpcError {
                code: -32001,
                message: "Task not found".into(),
                data: None,
            },
        );
        let err = decode_result::<Task>(response).unwrap_err();
        assert_eq!(err.to_string(), "A2A error -32001: Task not found");
    }

    #[test]
    fn test_decode_result_empty() {
        let response = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: json!(1),
            result: None,
            error: None,
        };
        assert!(decode_result::<Value>(response).is_err());
    }

    #[test]
    fn test_from_card() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "food",
            "url": "http://localhost:10002/",
            "version": "1.0.0"
        }))
        .unwrap();
        let client = A2aClient::from_card(&card).unwrap();
        assert_eq!(client.url(), "http://localhost:10002/");
    }

    #[tokio::test]
    async fn test_fetch_agent_card_connection_refused() {
        let resolver = A2aCardResolver::new("http://127.0.0.1:1/").unwrap();
        let err = resolver.get_agent_card().await.unwrap_err().to_string();
        assert!(err.contains("Failed to connect"));
    }

    #[tokio::test]
    async fn test_send_task_connection_refused() {
        let client = A2aClient::new("http://127.0.0.1:1").unwrap();
        let params = TaskSendParams {
            id: "t".into(),
            session_id: "s".into(),
            message: Message::user_text("hi"),
            accepted_output_modes: None,
            push_notification: None,
            history_length: None,
            metadata: None,
        };
        assert!(client.send_task(params.clone()).await.is_err());
        assert!(client.send_task_streaming(params).await.is_err());
    }

    fn send_params() -> TaskSendParams {
        TaskSendParams {
            id: "t".into(),
            session_id: "s".into(),
            message: Message::user_text("hi"),
            accepted_output_modes: None,
            push_notification: None,
            history_length: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_stream_times_out_when_agent_never_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            // accept and hold the connection without writing anything
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = A2aClient::new(url).unwrap().with_timeout(Duration::from_millis(300));
        let err = client.send_task_streaming(send_params()).await.err().unwrap();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_stream_keep_alives_do_not_extend_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            // ": ping\n\n" every 50ms, never an event
            while socket.write_all(b"8\r\n: ping\n\n\r\n").await.is_ok() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let client = A2aClient::new(url).unwrap().with_timeout(Duration::from_millis(400));
        let mut events = client.send_task_streaming(send_params()).await.unwrap();
        let err = events.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_get_and_cancel_connection_refused() {
        let client = A2aClient::new("http://127.0.0.1:1").unwrap();
        let query = TaskQueryParams {
            id: "t".into(),
            history_length: None,
            metadata: None,
        };
        assert!(client.get_task(query).await.is_err());
        let id = TaskIdParams {
            id: "t".into(),
            metadata: None,
        };
        assert!(client.cancel_task(id).await.is_err());
    }
}
