//! Test harness for handshake tests.
//!
//! Provides:
//! - MockIssuer: scripted token issuer that records every call
//! - TestHarness: a loopback frame, its channel and a session factory
//! - FakeHttpServer: a one-route HTTP server over a TcpListener

use crate::channel::{ChildFrameChannel, LoopbackFrame};
use crate::driver::{spawn_session, SessionHandle};
use crate::error::TokenIssuanceError;
use crate::fsm::HandshakeState;
use crate::issuer::TokenIssuer;
use crate::origin::WidgetEndpoint;
use crate::session::{HandshakeSession, HandshakeSnapshot, SessionConfig};
use crate::token::OneTimeToken;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const WIDGET_ORIGIN: &str = "https://widget.example.com";
pub const WIDGET_URL: &str = "https://widget.example.com/embed?model_id=gtdave";
pub const WIDGET_ID: &str = "gtdave";
pub const HOST_ORIGIN: &str = "https://host.example.com";
pub const EVIL_ORIGIN: &str = "https://evil.example";

/// One call observed by the mock issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerCall {
    pub widget_id: String,
    pub origin: String,
}

/// Scripted response for the next issuer call.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum IssuerResponse {
    Token { value: String, expires_in: i64 },
    Fail(TokenIssuanceError),
    /// Never resolve.
    Hang,
}

/// Token issuer with a response queue. Unscripted calls issue `tok-N`.
#[derive(Default)]
pub struct MockIssuer {
    calls: Mutex<Vec<IssuerCall>>,
    responses: Mutex<VecDeque<IssuerResponse>>,
    delay: Mutex<Option<Duration>>,
}

impl MockIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, response: IssuerResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn queue_token(&self, value: &str, expires_in: i64) {
        self.queue(IssuerResponse::Token {
            value: value.to_string(),
            expires_in,
        });
    }

    pub fn queue_failure(&self, err: TokenIssuanceError) {
        self.queue(IssuerResponse::Fail(err));
    }

    /// Delay every response by `delay` of tokio time.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<IssuerCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TokenIssuer for MockIssuer {
    async fn request_token(
        &self,
        widget_id: &str,
        requesting_origin: &str,
    ) -> Result<OneTimeToken, TokenIssuanceError> {
        let call_number = {
            let mut calls = self.calls.lock();
            calls.push(IssuerCall {
                widget_id: widget_id.to_string(),
                origin: requesting_origin.to_string(),
            });
            calls.len()
        };
        let response = self.responses.lock().pop_front();
        let delay = *self.delay.lock();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            Some(IssuerResponse::Token { value, expires_in }) => {
                OneTimeToken::new(value, expires_in)
            }
            Some(IssuerResponse::Fail(err)) => Err(err),
            Some(IssuerResponse::Hang) => std::future::pending().await,
            None => OneTimeToken::new(format!("tok-{}", call_number), 300),
        }
    }
}

/// A loopback frame at the widget origin, its channel and a mock issuer.
pub struct TestHarness {
    pub frame: Arc<LoopbackFrame>,
    pub channel: Arc<ChildFrameChannel>,
    pub issuer: Arc<MockIssuer>,
    pub endpoint: WidgetEndpoint,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_frame(LoopbackFrame::loaded(WIDGET_ORIGIN))
    }

    pub fn with_frame(frame: LoopbackFrame) -> Self {
        let frame = Arc::new(frame);
        let channel = Arc::new(ChildFrameChannel::new(frame.clone()));
        Self {
            frame,
            channel,
            issuer: Arc::new(MockIssuer::new()),
            endpoint: WidgetEndpoint::new(WIDGET_ID, WIDGET_URL).unwrap(),
        }
    }

    pub fn session(&self) -> HandshakeSession {
        self.session_with(SessionConfig::default())
    }

    pub fn session_with(&self, config: SessionConfig) -> HandshakeSession {
        HandshakeSession::new(
            self.endpoint.clone(),
            HOST_ORIGIN,
            self.issuer.clone(),
            self.channel.clone(),
            config,
        )
    }

    /// A session already in AwaitingFrameSignal.
    pub fn attached_session(&self) -> HandshakeSession {
        let mut session = self.session();
        session.attach().unwrap();
        session
    }

    pub fn spawn(&self) -> SessionHandle {
        spawn_session(self.session(), &self.channel)
    }

    pub fn load(&self) {
        self.channel.notify_loaded();
    }

    pub fn ready(&self) {
        self.ready_from(WIDGET_ORIGIN);
    }

    pub fn ready_from(&self, origin: &str) {
        self.channel.deliver(origin, json!({ "type": "WIDGET_READY" }));
    }

    pub fn complete(&self) {
        self.complete_from(WIDGET_ORIGIN);
    }

    pub fn complete_from(&self, origin: &str) {
        self.channel
            .deliver(origin, json!({ "type": "EXCHANGE_COMPLETE" }));
    }

    /// Token values that actually reached the frame, in order.
    pub fn delivered_tokens(&self) -> Vec<String> {
        self.frame
            .delivered()
            .into_iter()
            .filter_map(|m| m.payload.get("ott").and_then(|v| v.as_str()).map(String::from))
            .collect()
    }
}

/// Let spawned tasks run until they block.
pub async fn flush() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Wait until the published snapshot satisfies `predicate`.
pub async fn wait_until<F>(handle: &SessionHandle, predicate: F) -> HandshakeSnapshot
where
    F: FnMut(&HandshakeSnapshot) -> bool,
{
    let mut status = handle.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(30), status.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session status closed");
    snapshot.clone()
}

/// Wait until the session publishes `state`.
pub async fn wait_for_state(handle: &SessionHandle, state: HandshakeState) -> HandshakeSnapshot {
    wait_until(handle, |s| s.state == state).await
}

/// Drive a directly-owned session through one signal and its token result.
pub async fn run_request(session: &mut HandshakeSession, pending: crate::session::PendingToken) {
    let (generation, result) = pending.resolve().await;
    let _ = session.complete_token_request(generation, result);
}

/// Minimal HTTP/1.1 server answering every request with one canned response.
pub struct FakeHttpServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
    _task: tokio::task::JoinHandle<()>,
}

impl FakeHttpServer {
    pub async fn start(status: u16, body: &str) -> Self {
        Self::start_with_delay(status, body, Duration::ZERO).await
    }

    pub async fn start_with_delay(status: u16, body: &str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let body = body.to_string();

        let task = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let mut buf = vec![0u8; 16 * 1024];
                let mut read = 0;
                loop {
                    let n = match stream.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    read += n;
                    if request_complete(&buf[..read]) || read == buf.len() {
                        break;
                    }
                }
                recorded
                    .lock()
                    .push(String::from_utf8_lossy(&buf[..read]).to_string());

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let response = format!(
                    "HTTP/1.1 {} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            url: format!("http://{}", addr),
            requests,
            _task: task,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    text.len() >= header_end + 4 + content_length
}
