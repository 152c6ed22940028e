//! A2A server: JSON-RPC on `POST /`, agent card on `/.well-known/agent.json`

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::error::A2aError;
use crate::protocol::{AgentCard, JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse, methods};
use crate::task_manager::TaskManager;

#[derive(Clone)]
struct AppState {
    card: Arc<AgentCard>,
    manager: Arc<TaskManager>,
}

/// Serves one agent over A2A
pub struct A2aServer {
    card: AgentCard,
    manager: Arc<TaskManager>,
}

impl A2aServer {
    pub fn new(card: AgentCard, manager: TaskManager) -> Self {
        Self {
            card,
            manager: Arc::new(manager),
        }
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            card: Arc::new(self.card.clone()),
            manager: self.manager.clone(),
        };
        Router::new()
            .route("/", post(handle_rpc))
            .route("/.well-known/agent.json", get(agent_card))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind A2A server on {}", addr))?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener (lets tests pick an ephemeral port)
    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr().context("Listener has no local address")?;
        info!("A2A agent '{}' listening on http://{}", self.card.name, addr);
        axum::serve(listener, self.router())
            .await
            .context("A2A server terminated with error")
    }
}

async fn agent_card(State(state): State<AppState>) -> Json<AgentCard> {
    Json((*state.card).clone())
}

fn rpc_error(id: Value, err: A2aError) -> Response {
    Json(JsonRpcResponse::err(id, err.to_rpc_error())).into_response()
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, A2aError> {
    serde_json::from_value(params).map_err(|e| A2aError::InvalidParams(e.to_string()))
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, A2aError> {
    serde_json::to_value(value).map_err(|e| A2aError::Internal(e.to_string()))
}

async fn handle_rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Rejecting malformed JSON-RPC body: {}", e);
            return rpc_error(Value::Null, A2aError::Parse(e.to_string()));
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => return rpc_error(id, A2aError::InvalidRequest(e.to_string())),
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return rpc_error(
            id,
            A2aError::InvalidRequest(format!("unsupported jsonrpc version {}", request.jsonrpc)),
        );
    }

    debug!("JSON-RPC {} (id {})", request.method, request.id);
    if request.method == methods::SEND_TASK_SUBSCRIBE {
        return send_subscribe(&state, request.id, request.params).await;
    }

    let result = dispatch(&state, &request.method, request.params).await;
    match result {
        Ok(value) => Json(JsonRpcResponse::ok(request.id, value)).into_response(),
        Err(e) => {
            debug!("JSON-RPC {} failed: {}", request.method, e);
            rpc_error(request.id, e)
        }
    }
}

async fn dispatch(state: &AppState, method: &str, params: Value) -> Result<Value, A2aError> {
    let manager = &state.manager;
    match method {
        methods::SEND_TASK => to_result(manager.on_send_task(parse_params(params)?).await?),
        methods::GET_TASK => to_result(manager.on_get_task(parse_params(params)?)?),
        methods::CANCEL_TASK => to_result(manager.on_cancel_task(parse_params(params)?)?),
        methods::SET_PUSH_NOTIFICATION => manager.on_set_push_notification(params),
        methods::GET_PUSH_NOTIFICATION => manager.on_get_push_notification(params),
        methods::RESUBSCRIBE => manager.on_resubscribe(params),
        other => Err(A2aError::MethodNotFound(other.to_string())),
    }
}

fn sse_event(id: &Value, payload: Result<Value, A2aError>) -> Result<SseEvent, axum::Error> {
    let response = match payload {
        Ok(value) => JsonRpcResponse::ok(id.clone(), value),
        Err(e) => JsonRpcResponse::err(id.clone(), e.to_rpc_error()),
    };
    SseEvent::default().json_data(response)
}

async fn send_subscribe(state: &AppState, id: Value, params: Value) -> Response {
    let events = match parse_params(params) {
        Ok(params) => state.manager.on_send_task_subscribe(params).await,
        Err(e) => Err(e),
    };

    let stream = async_stream::stream! {
        match events {
            Ok(mut events) => {
                while let Some(event) = events.next().await {
                    yield sse_event(&id, to_result(&event));
                }
            }
            Err(e) => {
                warn!("Rejecting streaming task: {}", e);
                yield sse_event(&id, Err(e));
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AgentCapabilities;
    use crate::task_manager::tests::ScriptedAgent;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn card() -> AgentCard {
        AgentCard {
            name: "Test Agent".into(),
            description: None,
            url: "http://localhost:10002/".into(),
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
        }
    }

    fn server() -> A2aServer {
        let manager = TaskManager::new(Arc::new(ScriptedAgent::replying("done")))
            .with_signature_verification(false);
        A2aServer::new(card(), manager)
    }

    async fn post_json(router: Router, body: &str) -> Value {
        let response = router
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_parse_error() {
        let v = post_json(server().router(), "{not json").await;
        assert_eq!(v["error"]["code"], -32700);
        assert!(v["id"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_request() {
        let v = post_json(server().router(), r#"{"jsonrpc":"1.0","id":7,"method":"tasks/get"}"#).await;
        assert_eq!(v["error"]["code"], -32600);
        assert_eq!(v["id"], 7);

        let v = post_json(server().router(), r#"{"jsonrpc":"2.0","id":8}"#).await;
        assert_eq!(v["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let v = post_json(
            server().router(),
            r#"{"jsonrpc":"2.0","id":"a","method":"tasks/explode","params":{}}"#,
        )
        .await;
        assert_eq!(v["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let v = post_json(
            server().router(),
            r#"{"jsonrpc":"2.0","id":1,"method":"tasks/send","params":{"id":"t"}}"#,
        )
        .await;
        assert_eq!(v["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_send_and_get() {
        let server = server();
        let send = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tasks/send",
            "params": {
                "id": "t1",
                "sessionId": "s1",
                "message": {"role": "user", "parts": [{"type": "text", "text": "pizza"}]}
            }
        });
        let v = post_json(server.router(), &send.to_string()).await;
        assert_eq!(v["result"]["status"]["state"], "completed");
        assert_eq!(v["result"]["sessionId"], "s1");

        let get = json!({"jsonrpc": "2.0", "id": 2, "method": "tasks/get", "params": {"id": "t1"}});
        let v = post_json(server.router(), &get.to_string()).await;
        assert_eq!(v["result"]["id"], "t1");
        assert_eq!(v["result"]["history"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_push_notifications_unsupported() {
        let v = post_json(
            server().router(),
            r#"{"jsonrpc":"2.0","id":1,"method":"tasks/pushNotification/set","params":{}}"#,
        )
        .await;
        assert_eq!(v["error"]["code"], -32003);
    }

    #[tokio::test]
    async fn test_agent_card_route() {
        let response = server()
            .router()
            .oneshot(
                Request::get("/.well-known/agent.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["name"], "Test Agent");
        assert_eq!(v["capabilities"]["streaming"], true);
    }
}
