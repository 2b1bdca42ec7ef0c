//! Shared utilities for integration testing.
//!
//! `MockGateway` serves the gateway's HTTP and WebSocket routes from an
//! in-process axum router bound to an ephemeral port.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Scripted step of the monitor socket after the handshake ack.
#[derive(Debug, Clone)]
pub enum WsStep {
    Send(Value),
    Close(u16),
}

#[derive(Default)]
pub struct GatewayState {
    pub services: Mutex<Value>,
    pub post_responses: Mutex<VecDeque<(u16, Value)>>,
    pub posts: Mutex<Vec<Value>>,
    pub gets: Mutex<Vec<String>>,
    pub receipt: Mutex<Value>,
    pub result_calls: AtomicUsize,
    pub finality_responses: Mutex<VecDeque<(u16, Value)>>,
    pub finality_calls: AtomicUsize,
    pub ws_script: Mutex<Vec<WsStep>>,
    pub handshakes: Mutex<Vec<Value>>,
    pub client_closes: Mutex<Vec<Option<u16>>>,
    pub requests: AtomicUsize,
}

impl GatewayState {
    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn push_post_response(&self, status: u16, body: Value) {
        self.post_responses.lock().unwrap().push_back((status, body));
    }

    pub fn push_finality(&self, status: u16, body: Value) {
        self.finality_responses.lock().unwrap().push_back((status, body));
    }
}

pub struct MockGateway {
    pub addr: SocketAddr,
    pub state: Arc<GatewayState>,
}

impl MockGateway {
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

/// Services used across tests: one ICON and one BSC network.
pub fn default_services() -> Value {
    json!([
        {"name": "bmc", "networks": {"icon_test": "icon", "bsc_test": "bsc"}},
        {"name": "dappsample", "networks": {"icon_test": "icon", "bsc_test": "bsc"}}
    ])
}

pub fn icon_receipt(block_id: &str, height: u64) -> Value {
    json!({
        "BlockHash": block_id,
        "BlockHeight": height,
        "Raw": {
            "cumulativeStepUsed": "0x1d4c0",
            "stepUsed": "0x1d4c0",
            "stepPrice": "0x2e90edd00",
            "eventLogs": []
        },
        "Failure": null
    })
}

pub fn icon_event_log(name: &str, height: u64) -> Value {
    json!({
        "Name": name,
        "Params": {"_from": "btp://0x2.icon/hx01", "_sn": "0x1"},
        "BaseEvent": {
            "BlockHash": format!("0xblock{height}"),
            "BlockHeight": height,
            "TxHash": "0xtx",
            "TxIndex": 0,
            "IndexInTx": 2
        }
    })
}

/// Start the mock gateway on an ephemeral port.
pub async fn start_gateway() -> MockGateway {
    let state = Arc::new(GatewayState::default());
    *state.services.lock().unwrap() = default_services();

    let app = Router::new()
        .route("/api", get(services))
        .route("/api/result/{id}", get(result))
        .route("/api/finality/{id}", get(finality))
        .route("/api/{service}/{method}", get(call).post(transact))
        .route("/monitor/{service}/event", get(monitor))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockGateway { addr, state }
}

fn reply(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

async fn services(State(state): State<Arc<GatewayState>>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let services = state.services.lock().unwrap().clone();
    reply(200, services)
}

async fn result(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.result_calls.fetch_add(1, Ordering::SeqCst);
    state
        .gets
        .lock()
        .unwrap()
        .push(format!("/api/result/{id}?{}", query.unwrap_or_default()));
    let receipt = state.receipt.lock().unwrap().clone();
    reply(200, receipt)
}

async fn finality(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.finality_calls.fetch_add(1, Ordering::SeqCst);
    state
        .gets
        .lock()
        .unwrap()
        .push(format!("/api/finality/{id}?{}", query.unwrap_or_default()));
    let (status, body) = state
        .finality_responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((200, json!(false)));
    reply(status, body)
}

async fn call(
    State(state): State<Arc<GatewayState>>,
    Path((service, method)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let query = query.unwrap_or_default();
    state
        .gets
        .lock()
        .unwrap()
        .push(format!("/api/{service}/{method}?{query}"));
    reply(200, json!({"service": service, "method": method, "query": query}))
}

async fn transact(
    State(state): State<Arc<GatewayState>>,
    Path((_service, _method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.posts.lock().unwrap().push(body);
    let (status, body) = state
        .post_responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((500, json!({"code": -1, "message": "no scripted response"})));
    reply(status, body)
}

async fn monitor(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| run_monitor(socket, state))
}

async fn run_monitor(mut socket: WebSocket, state: Arc<GatewayState>) {
    if let Some(Ok(Message::Text(text))) = socket.recv().await {
        let handshake: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
        state.handshakes.lock().unwrap().push(handshake);
    }
    let ack = json!({"code": 0, "message": "ok"}).to_string();
    if socket.send(Message::Text(ack.into())).await.is_err() {
        return;
    }

    // A client that closes early still gets its close frame recorded below.
    let script = state.ws_script.lock().unwrap().clone();
    for step in script {
        match step {
            WsStep::Send(value) => {
                if socket.send(Message::Text(value.to_string().into())).await.is_err() {
                    break;
                }
            }
            WsStep::Close(code) => {
                let frame = CloseFrame {
                    code,
                    reason: String::from("scripted close").into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
                return;
            }
        }
    }

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Close(frame)) => {
                state
                    .client_closes
                    .lock()
                    .unwrap()
                    .push(frame.map(|f| f.code));
                return;
            }
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

/// Poll `check` every few milliseconds until it holds or `timeout` passes.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
