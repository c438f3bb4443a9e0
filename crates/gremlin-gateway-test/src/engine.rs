//! StubEngine: a scripted Gremlin server on an ephemeral port.
//!
//! Speaks the driver WebSocket protocol for real (framed requests in, JSON
//! responses out, optional SASL PLAIN challenge), and answers every query
//! from a closure. Counts connections so tests can check that the gateway
//! closes what it opens.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use uuid::Uuid;

use gremlin_gateway::protocol::{Codec, Request, Response, ResponseResult, ResponseStatus};

/// How the engine answers one query.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Values of one type, streamed as one frame per chunk. Every chunk but
    /// the last is sent as partial content.
    Data {
        r#type: String,
        chunks: Vec<Vec<Value>>,
    },
    /// A terminal 204.
    Empty,
    /// An error status.
    Error {
        code: u16,
        message: String,
        attributes: BTreeMap<String, Value>,
    },
    /// Drop the connection without answering.
    Close,
    /// Wait, then answer.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    /// A single `g:List` frame.
    pub fn list(values: Vec<Value>) -> Self {
        Reply::Data {
            r#type: "g:List".into(),
            chunks: vec![values],
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn after(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }
}

type Script = dyn Fn(&str) -> Reply + Send + Sync;

struct EngineState {
    script: Box<Script>,
    credentials: Option<(String, String)>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

/// A running stub engine. Stops accepting when dropped.
pub struct StubEngine {
    addr: SocketAddr,
    state: Arc<EngineState>,
    accept_loop: JoinHandle<()>,
}

impl StubEngine {
    /// Start an engine that accepts anonymous connections.
    pub async fn start(
        script: impl Fn(&str) -> Reply + Send + Sync + 'static,
    ) -> std::io::Result<Self> {
        Self::spawn(Box::new(script), None).await
    }

    /// Start an engine that challenges every query for SASL PLAIN credentials.
    pub async fn start_with_auth(
        username: &str,
        password: &str,
        script: impl Fn(&str) -> Reply + Send + Sync + 'static,
    ) -> std::io::Result<Self> {
        Self::spawn(
            Box::new(script),
            Some((username.to_string(), password.to_string())),
        )
        .await
    }

    async fn spawn(
        script: Box<Script>,
        credentials: Option<(String, String)>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(EngineState {
            script,
            credentials,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let accept_state = Arc::clone(&state);
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, Arc::clone(&accept_state)));
            }
        });

        Ok(Self {
            addr,
            state,
            accept_loop,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL of the engine.
    pub fn url(&self) -> String {
        format!("ws://{}/gremlin", self.addr)
    }

    /// WebSocket connections accepted so far.
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// WebSocket connections that have ended.
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Most connections open at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Every decoded request, including SASL answers.
    pub fn requests(&self) -> Vec<Request> {
        self.state.requests.lock().clone()
    }

    /// Scripts of every `eval` request, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .iter()
            .filter_map(|r| r.gremlin().map(str::to_string))
            .collect()
    }

    /// Wait until every opened connection has ended, or `timeout` passes.
    pub async fn wait_all_closed(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.closed() == self.opened() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for StubEngine {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<EngineState>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    state.opened.fetch_add(1, Ordering::SeqCst);
    let now_active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_active.fetch_max(now_active, Ordering::SeqCst);

    serve(ws, &state).await;

    state.active.fetch_sub(1, Ordering::SeqCst);
    state.closed.fetch_add(1, Ordering::SeqCst);
}

async fn serve(mut ws: WebSocketStream<TcpStream>, state: &EngineState) {
    let codec = Codec::default();
    let mut authenticated = state.credentials.is_none();
    let mut pending: Option<Request> = None;

    while let Some(Ok(message)) = ws.next().await {
        let bytes = match message {
            Message::Binary(bytes) => bytes,
            Message::Close(_) => {
                let _ = ws.close(None).await;
                break;
            }
            _ => continue,
        };

        let request = match codec.decode_request(&bytes) {
            Ok(request) => request,
            Err(e) => {
                let reply = Reply::error(499, format!("malformed request: {}", e));
                if !send_reply(&mut ws, &codec, Uuid::nil(), reply).await {
                    break;
                }
                continue;
            }
        };
        state.requests.lock().push(request.clone());

        let to_answer = if request.op == "authentication" {
            match pending.take() {
                Some(original) if sasl_matches(&request, state.credentials.as_ref()) => {
                    authenticated = true;
                    original
                }
                Some(original) => {
                    let reply = Reply::error(401, "Username and/or password are incorrect");
                    if !send_reply(&mut ws, &codec, original.id, reply).await {
                        break;
                    }
                    continue;
                }
                None => continue,
            }
        } else if !authenticated {
            let challenge = response(request.id, 407, "", None);
            pending = Some(request);
            if !send_response(&mut ws, &codec, &challenge).await {
                break;
            }
            continue;
        } else {
            request
        };

        let reply = (state.script)(to_answer.gremlin().unwrap_or_default());
        if !send_reply(&mut ws, &codec, to_answer.id, reply).await {
            break;
        }
    }
}

fn sasl_matches(request: &Request, expected: Option<&(String, String)>) -> bool {
    let Some((username, password)) = expected else {
        return true;
    };
    let decoded = request
        .args
        .get("sasl")
        .and_then(Value::as_str)
        .and_then(|s| STANDARD.decode(s).ok());
    let mut want = vec![0u8];
    want.extend_from_slice(username.as_bytes());
    want.push(0);
    want.extend_from_slice(password.as_bytes());
    decoded.as_deref() == Some(want.as_slice())
}

/// Send `reply`. Returns false when the connection should end.
async fn send_reply(
    ws: &mut WebSocketStream<TcpStream>,
    codec: &Codec,
    request_id: Uuid,
    reply: Reply,
) -> bool {
    let mut reply = reply;
    let reply = loop {
        match reply {
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            other => break other,
        }
    };

    match reply {
        Reply::Data { r#type, chunks } if !chunks.is_empty() => {
            let last = chunks.len() - 1;
            for (i, values) in chunks.into_iter().enumerate() {
                let code = if i == last { 200 } else { 206 };
                let data = json!({"@type": r#type, "@value": values});
                let frame = response(request_id, code, "", Some(data));
                if !send_response(ws, codec, &frame).await {
                    return false;
                }
            }
            true
        }
        Reply::Data { .. } | Reply::Empty => {
            send_response(ws, codec, &response(request_id, 204, "", None)).await
        }
        Reply::Error {
            code,
            message,
            attributes,
        } => {
            let mut frame = response(request_id, code, &message, None);
            frame.status.attributes = attributes;
            send_response(ws, codec, &frame).await
        }
        Reply::Close | Reply::Delayed(..) => false,
    }
}

async fn send_response(
    ws: &mut WebSocketStream<TcpStream>,
    codec: &Codec,
    response: &Response,
) -> bool {
    match codec.encode_response(response) {
        Ok(bytes) => ws.send(Message::binary(bytes)).await.is_ok(),
        Err(_) => false,
    }
}

fn response(request_id: Uuid, code: u16, message: &str, data: Option<Value>) -> Response {
    Response {
        request_id,
        status: ResponseStatus {
            code,
            message: message.to_string(),
            attributes: BTreeMap::new(),
        },
        result: ResponseResult {
            meta: BTreeMap::new(),
            data: data.and_then(|d| RawValue::from_string(d.to_string()).ok()),
        },
    }
}
