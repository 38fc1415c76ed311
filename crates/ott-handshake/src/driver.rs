//! Async driver that runs one [`HandshakeSession`] on a tokio task.
//!
//! Channel callbacks only enqueue [`SessionEvent`]s; the task processes them
//! in arrival order, owns the settle timer and the in-flight token request,
//! and is the only code that mutates the session.

use crate::channel::ChildFrameChannel;
use crate::error::{HandshakeError, HandshakeResult, TokenIssuanceError};
use crate::protocol::{IncomingMessage, WIDGET_READY};
use crate::session::{HandshakeSession, HandshakeSnapshot, PendingToken};
use crate::token::OneTimeToken;
use std::future::pending;
use std::pin::Pin;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::{debug, warn};

/// Input to the driver task.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    FrameLoaded,
    FrameReady(IncomingMessage),
    Message(IncomingMessage),
    Retry,
    Dispose,
}

/// Register the three channel listeners, forwarding into `events`.
///
/// `WIDGET_READY` reaches the session through the ready listener only.
pub fn connect_channel(channel: &ChildFrameChannel, events: mpsc::UnboundedSender<SessionEvent>) {
    let loaded = events.clone();
    channel.on_frame_loaded(move || {
        let _ = loaded.send(SessionEvent::FrameLoaded);
    });

    let ready = events.clone();
    channel.on_frame_ready(move |message| {
        let _ = ready.send(SessionEvent::FrameReady(message.clone()));
    });

    channel.on_message(move |message| {
        if message.message_type() == Some(WIDGET_READY) {
            return;
        }
        let _ = events.send(SessionEvent::Message(message.clone()));
    });
}

/// Handle to a running session task.
///
/// Dropping the handle disposes the session. The channel listeners keep
/// the event queue open, so the task never ends on its own.
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Receiver<HandshakeSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Sender for feeding events; the same one the channel listeners use.
    pub fn events(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events.clone()
    }

    pub fn snapshot(&self) -> HandshakeSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HandshakeSnapshot> {
        self.status.clone()
    }

    pub fn retry(&self) -> HandshakeResult<()> {
        self.events
            .send(SessionEvent::Retry)
            .map_err(|_| HandshakeError::Disposed)
    }

    /// Ask the task to dispose the session. Does not wait.
    pub fn dispose(&self) {
        let _ = self.events.send(SessionEvent::Dispose);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Dispose and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.dispose();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Handshake task ended abnormally");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!("Session handle dropped, disposing session");
            self.dispose();
        }
    }
}

/// Wire `channel` to `session`, attach it, and run it on a new task.
pub fn spawn_session(mut session: HandshakeSession, channel: &ChildFrameChannel) -> SessionHandle {
    let (events, receiver) = mpsc::unbounded_channel();
    connect_channel(channel, events.clone());

    let status = session.subscribe();
    if let Err(e) = session.attach() {
        debug!(error = %e, "Session already attached");
    }

    let task = tokio::spawn(run(session, receiver));
    SessionHandle {
        events,
        status,
        task: Some(task),
    }
}

async fn await_token(
    slot: &mut Option<PendingToken>,
) -> (u64, Result<OneTimeToken, TokenIssuanceError>) {
    match slot.as_mut() {
        Some(request) => {
            let result = request.future_mut().as_mut().await;
            let generation = request.generation();
            *slot = None;
            (generation, result)
        }
        None => pending().await,
    }
}

async fn await_settle(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot.as_mut() {
        Some(timer) => {
            timer.as_mut().await;
            *slot = None;
        }
        None => pending().await,
    }
}

fn log_rejected(err: &HandshakeError) {
    debug!(error = %err, "Session event rejected");
}

async fn run(mut session: HandshakeSession, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    let mut in_flight: Option<PendingToken> = None;
    let mut settle: Option<Pin<Box<Sleep>>> = None;

    loop {
        tokio::select! {
            biased;

            event = events.recv() => {
                match event {
                    None | Some(SessionEvent::Dispose) => break,
                    Some(SessionEvent::FrameLoaded) => {
                        if session.on_frame_loaded() {
                            settle = Some(Box::pin(sleep(session.settle_delay())));
                        }
                    }
                    Some(SessionEvent::FrameReady(message)) => {
                        match session.on_frame_ready(&message) {
                            Ok(Some(request)) => in_flight = Some(request),
                            Ok(None) => {}
                            Err(e) => log_rejected(&e),
                        }
                    }
                    Some(SessionEvent::Message(message)) => {
                        match session.on_message(&message) {
                            Ok(Some(request)) => in_flight = Some(request),
                            Ok(None) => {}
                            Err(e) => log_rejected(&e),
                        }
                    }
                    Some(SessionEvent::Retry) => {
                        match session.retry() {
                            Ok(request) => in_flight = Some(request),
                            Err(e) => log_rejected(&e),
                        }
                    }
                }
            }

            (generation, result) = await_token(&mut in_flight) => {
                if let Err(e) = session.complete_token_request(generation, result) {
                    log_rejected(&e);
                }
            }

            _ = await_settle(&mut settle) => {
                if let Some(request) = session.on_load_settled() {
                    in_flight = Some(request);
                }
            }
        }
    }

    // Dropping the in-flight future abandons the request.
    drop(in_flight);
    session.dispose();
}
