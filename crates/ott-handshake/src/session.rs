//! Handshake session: coordinates token request, delivery and acknowledgement
//! for exactly one embedded frame instance.
//!
//! The session itself never suspends. Operations that need the issuer return a
//! [`PendingToken`] which the caller (normally the driver) awaits and feeds
//! back through [`HandshakeSession::complete_token_request`]. Every result is
//! tagged with the request generation it belongs to, so results arriving after
//! a retry or disposal are ignored.

use crate::channel::ChildFrameChannel;
use crate::error::{ChannelError, ErrorKind, HandshakeError, HandshakeResult, TokenIssuanceError};
use crate::fsm::{HandshakeMachine, HandshakeMachineInput, HandshakeState};
use crate::issuer::TokenIssuer;
use crate::origin::{is_trusted, WidgetEndpoint};
use crate::protocol::{HostMessage, IncomingMessage, WidgetMessage};
use crate::token::OneTimeToken;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default delay between the frame's load event and the token request.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default bound on token requests per session, initial request included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Completion messages held while a token request is in flight.
const MAX_EARLY_COMPLETIONS: usize = 4;

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a load event must go unanswered before it triggers the request.
    pub settle_delay: Duration,
    pub max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Observable session state, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeSnapshot {
    pub frame_id: Uuid,
    pub state: HandshakeState,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
}

type TokenFuture = Pin<Box<dyn Future<Output = Result<OneTimeToken, TokenIssuanceError>> + Send>>;

/// An issued token request that has not been awaited yet.
pub struct PendingToken {
    generation: u64,
    future: TokenFuture,
}

impl PendingToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Await the issuer, yielding the generation alongside the result.
    pub async fn resolve(self) -> (u64, Result<OneTimeToken, TokenIssuanceError>) {
        let result = self.future.await;
        (self.generation, result)
    }

    pub(crate) fn future_mut(&mut self) -> &mut TokenFuture {
        &mut self.future
    }
}

impl std::fmt::Debug for PendingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingToken")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// One handshake per embedded frame lifetime.
pub struct HandshakeSession {
    frame_id: Uuid,
    endpoint: WidgetEndpoint,
    host_origin: String,
    issuer: Arc<dyn TokenIssuer>,
    channel: Arc<ChildFrameChannel>,
    config: SessionConfig,
    machine: HandshakeMachine,
    attempt_count: u32,
    generation: u64,
    last_error: Option<ErrorKind>,
    load_seen: bool,
    early_completions: VecDeque<IncomingMessage>,
    status: watch::Sender<HandshakeSnapshot>,
}

impl HandshakeSession {
    pub fn new(
        endpoint: WidgetEndpoint,
        host_origin: impl Into<String>,
        issuer: Arc<dyn TokenIssuer>,
        channel: Arc<ChildFrameChannel>,
        config: SessionConfig,
    ) -> Self {
        let frame_id = Uuid::new_v4();
        let (status, _) = watch::channel(HandshakeSnapshot {
            frame_id,
            state: HandshakeState::Idle,
            attempt_count: 0,
            last_error: None,
        });

        Self {
            frame_id,
            endpoint,
            host_origin: host_origin.into(),
            issuer,
            channel,
            config,
            machine: HandshakeMachine::new(),
            attempt_count: 0,
            generation: 0,
            last_error: None,
            load_seen: false,
            early_completions: VecDeque::new(),
            status,
        }
    }

    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub fn state(&self) -> HandshakeState {
        HandshakeState::from(self.machine.state())
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn endpoint(&self) -> &WidgetEndpoint {
        &self.endpoint
    }

    pub fn settle_delay(&self) -> Duration {
        self.config.settle_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn snapshot(&self) -> HandshakeSnapshot {
        HandshakeSnapshot {
            frame_id: self.frame_id,
            state: self.state(),
            attempt_count: self.attempt_count,
            last_error: self.last_error,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HandshakeSnapshot> {
        self.status.subscribe()
    }

    fn is_disposed(&self) -> bool {
        self.state().is_disposed()
    }

    fn transition(&mut self, input: HandshakeMachineInput) -> HandshakeResult<()> {
        let from = self.state();
        self.machine.consume(&input).map_err(|_| {
            HandshakeError::InvalidStateTransition(format!("{:?} on {:?}", from, input))
        })?;
        debug!(frame_id = %self.frame_id, ?from, to = ?self.state(), "Handshake transition");
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Idle → AwaitingFrameSignal, once the channel listeners are wired.
    pub fn attach(&mut self) -> HandshakeResult<()> {
        self.transition(HandshakeMachineInput::ChannelAttached)?;
        info!(
            frame_id = %self.frame_id,
            widget_id = %self.endpoint.widget_id(),
            origin = %self.endpoint.origin(),
            "Widget frame attached"
        );
        Ok(())
    }

    /// Record the frame's load event. Returns true if the caller should arm
    /// the settle timer.
    pub fn on_frame_loaded(&mut self) -> bool {
        if self.state() != HandshakeState::AwaitingFrameSignal {
            debug!(frame_id = %self.frame_id, state = ?self.state(), "Ignoring frame load");
            return false;
        }
        if self.load_seen {
            debug!(frame_id = %self.frame_id, "Duplicate frame load");
            return false;
        }
        self.load_seen = true;
        true
    }

    /// The settle delay after a load event elapsed.
    pub fn on_load_settled(&mut self) -> Option<PendingToken> {
        if !self.load_seen {
            return None;
        }
        self.begin_from_signal("load")
    }

    /// Handle a `WIDGET_READY` message.
    pub fn on_frame_ready(
        &mut self,
        message: &IncomingMessage,
    ) -> HandshakeResult<Option<PendingToken>> {
        if self.is_disposed() {
            return Ok(None);
        }
        self.check_origin(message)?;
        Ok(self.begin_from_signal("ready"))
    }

    /// Handle any inbound message from the channel.
    pub fn on_message(
        &mut self,
        message: &IncomingMessage,
    ) -> HandshakeResult<Option<PendingToken>> {
        if self.is_disposed() {
            return Ok(None);
        }
        self.check_origin(message)?;

        let parsed = message.parse().map_err(|e| {
            warn!(frame_id = %self.frame_id, error = %e, "Dropped malformed widget message");
            e
        })?;

        match parsed {
            WidgetMessage::WidgetReady => Ok(self.begin_from_signal("ready")),
            WidgetMessage::ExchangeComplete => {
                self.on_exchange_complete(message)?;
                Ok(None)
            }
        }
    }

    fn check_origin(&self, message: &IncomingMessage) -> HandshakeResult<()> {
        if is_trusted(&message.origin, &self.endpoint) {
            return Ok(());
        }
        warn!(
            frame_id = %self.frame_id,
            origin = %message.origin,
            expected = %self.endpoint.origin(),
            message_type = message.message_type().unwrap_or("<none>"),
            "Dropped message from untrusted origin"
        );
        Err(HandshakeError::OriginMismatch {
            origin: message.origin.clone(),
        })
    }

    fn on_exchange_complete(&mut self, message: &IncomingMessage) -> HandshakeResult<()> {
        match self.state() {
            HandshakeState::Delivering => {
                self.transition(HandshakeMachineInput::ExchangeComplete)?;
                info!(
                    frame_id = %self.frame_id,
                    attempt = self.attempt_count,
                    "Widget acknowledged token exchange"
                );
            }
            HandshakeState::Acknowledged => {
                debug!(frame_id = %self.frame_id, "Duplicate exchange completion");
            }
            HandshakeState::RequestingToken => {
                if self.early_completions.len() < MAX_EARLY_COMPLETIONS {
                    self.early_completions.push_back(message.clone());
                    debug!(frame_id = %self.frame_id, "Queued completion received before delivery");
                } else {
                    debug!(frame_id = %self.frame_id, "Early completion queue full, dropping");
                }
            }
            state => {
                debug!(frame_id = %self.frame_id, ?state, "Ignoring exchange completion");
            }
        }
        Ok(())
    }

    fn begin_from_signal(&mut self, signal: &'static str) -> Option<PendingToken> {
        if self.state() != HandshakeState::AwaitingFrameSignal {
            debug!(frame_id = %self.frame_id, signal, state = ?self.state(), "Readiness signal is a no-op");
            return None;
        }

        if self.attempt_count >= self.config.max_attempts {
            if self.last_error.is_none() {
                self.last_error = Some(ErrorKind::FrameUnavailable);
            }
            if self.transition(HandshakeMachineInput::AttemptsExhausted).is_err() {
                return None;
            }
            error!(
                frame_id = %self.frame_id,
                attempts = self.attempt_count,
                "No token attempts left for this frame"
            );
            return None;
        }

        if self.transition(HandshakeMachineInput::FrameSignal).is_err() {
            return None;
        }
        info!(frame_id = %self.frame_id, signal, "Frame ready, requesting token");
        Some(self.start_request())
    }

    fn start_request(&mut self) -> PendingToken {
        self.attempt_count += 1;
        self.generation += 1;
        self.publish();

        debug!(
            frame_id = %self.frame_id,
            attempt = self.attempt_count,
            generation = self.generation,
            "Token request started"
        );

        let issuer = Arc::clone(&self.issuer);
        let widget_id = self.endpoint.widget_id().to_string();
        let origin = self.host_origin.clone();
        PendingToken {
            generation: self.generation,
            future: Box::pin(async move { issuer.request_token(&widget_id, &origin).await }),
        }
    }

    /// User-initiated retry after a failure. Always requests a fresh token.
    pub fn retry(&mut self) -> HandshakeResult<PendingToken> {
        match self.state() {
            HandshakeState::Failed => {}
            HandshakeState::Disposed => return Err(HandshakeError::Disposed),
            state => {
                return Err(HandshakeError::InvalidStateTransition(format!(
                    "retry from {:?}",
                    state
                )))
            }
        }
        if self.attempt_count >= self.config.max_attempts {
            warn!(frame_id = %self.frame_id, attempts = self.attempt_count, "Retry refused, attempts exhausted");
            return Err(HandshakeError::RetryExhausted(self.attempt_count));
        }

        self.transition(HandshakeMachineInput::Retry)?;
        info!(frame_id = %self.frame_id, attempt = self.attempt_count + 1, "Retrying token request");
        Ok(self.start_request())
    }

    /// Apply the outcome of a token request started by this session.
    pub fn complete_token_request(
        &mut self,
        generation: u64,
        result: Result<OneTimeToken, TokenIssuanceError>,
    ) -> HandshakeResult<()> {
        if self.is_disposed() {
            debug!(frame_id = %self.frame_id, "Discarding token result after disposal");
            return Err(HandshakeError::Disposed);
        }
        if generation != self.generation || self.state() != HandshakeState::RequestingToken {
            debug!(frame_id = %self.frame_id, generation, current = self.generation, "Discarding stale token result");
            return Ok(());
        }

        match result {
            Ok(token) => self.deliver(token),
            Err(err) => {
                self.last_error = Some(ErrorKind::TokenIssuance);
                self.early_completions.clear();
                self.transition(HandshakeMachineInput::IssuanceFailed)?;
                if self.attempt_count >= self.config.max_attempts {
                    error!(frame_id = %self.frame_id, attempts = self.attempt_count, error = %err, "Token issuance failed, no attempts left");
                } else {
                    warn!(frame_id = %self.frame_id, attempt = self.attempt_count, error = %err, "Token issuance failed");
                }
                Err(HandshakeError::TokenIssuance(err))
            }
        }
    }

    fn deliver(&mut self, token: OneTimeToken) -> HandshakeResult<()> {
        let expected = self.endpoint.origin().to_string();

        match self.channel.current_origin() {
            None => {
                debug!(frame_id = %self.frame_id, "Frame has no content window, token discarded");
                return self.abort_delivery(HandshakeError::FrameUnavailable);
            }
            Some(current) if current != expected => {
                warn!(
                    frame_id = %self.frame_id,
                    origin = %current,
                    expected = %expected,
                    "Frame navigated away from widget origin, token discarded"
                );
                return self.abort_delivery(HandshakeError::OriginMismatch { origin: current });
            }
            Some(_) => {}
        }

        let hint = token.redacted();
        let expires_in = token.expires_in_secs();
        let message = HostMessage::token_delivered(token);

        match self.channel.send(&message, &expected) {
            Ok(()) => {}
            Err(ChannelError::FrameUnavailable) => {
                return self.abort_delivery(HandshakeError::FrameUnavailable)
            }
            Err(err) => return self.abort_delivery(err.into()),
        }

        self.transition(HandshakeMachineInput::TokenDispatched)?;
        info!(
            frame_id = %self.frame_id,
            origin = %expected,
            hint = %hint,
            expires_in,
            attempt = self.attempt_count,
            "Token delivered to widget"
        );

        let queued: Vec<IncomingMessage> = self.early_completions.drain(..).collect();
        for message in queued {
            if let Err(e) = self.on_message(&message) {
                debug!(frame_id = %self.frame_id, error = %e, "Queued message rejected on re-check");
            }
        }
        Ok(())
    }

    fn abort_delivery(&mut self, err: HandshakeError) -> HandshakeResult<()> {
        self.last_error = Some(ErrorKind::FrameUnavailable);
        self.load_seen = false;
        self.early_completions.clear();
        self.transition(HandshakeMachineInput::DeliveryAborted)?;
        Err(err)
    }

    /// Release every listener and abandon any in-flight request. Idempotent.
    pub fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.generation += 1;
        self.early_completions.clear();
        self.channel.destroy();
        if let Err(e) = self.transition(HandshakeMachineInput::Dispose) {
            debug!(frame_id = %self.frame_id, error = %e, "Dispose transition rejected");
        }
        info!(frame_id = %self.frame_id, "Handshake session disposed");
    }
}

impl Drop for HandshakeSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
