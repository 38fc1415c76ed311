//! Child-frame messaging channel.
//!
//! The channel owns every listener the handshake registers on the frame and
//! the host window, and is the only path by which anything is posted into the
//! frame. Origin checks are the session's job; the channel only refuses
//! wildcard targets.

use crate::error::ChannelError;
use crate::protocol::{HostMessage, IncomingMessage, WIDGET_READY};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The embedding surface behind a frame element.
pub trait FrameTransport: Send + Sync {
    /// Post serialized data into the frame's content window, scoped to `target_origin`.
    fn post_message(&self, data: &str, target_origin: &str) -> Result<(), ChannelError>;

    /// The origin currently loaded in the frame, or `None` if it has no live
    /// content window.
    fn current_origin(&self) -> Option<String>;
}

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type MessageHandler = Arc<dyn Fn(&IncomingMessage) + Send + Sync>;
type LoadHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    message: HashMap<ListenerId, MessageHandler>,
    loaded: HashMap<ListenerId, LoadHandler>,
    ready: HashMap<ListenerId, MessageHandler>,
}

impl Listeners {
    fn len(&self) -> usize {
        self.message.len() + self.loaded.len() + self.ready.len()
    }

    fn clear(&mut self) {
        self.message.clear();
        self.loaded.clear();
        self.ready.clear();
    }
}

/// Channel between the host and one widget frame.
pub struct ChildFrameChannel {
    transport: Arc<dyn FrameTransport>,
    listeners: Mutex<Listeners>,
    next_id: AtomicU64,
    destroyed: AtomicBool,
}

impl ChildFrameChannel {
    pub fn new(transport: Arc<dyn FrameTransport>) -> Self {
        Self {
            transport,
            listeners: Mutex::new(Listeners::default()),
            next_id: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe to every inbound message, whatever its origin.
    pub fn on_message<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&IncomingMessage) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        if !self.is_destroyed() {
            self.listeners.lock().message.insert(id, Arc::new(handler));
        }
        id
    }

    /// Subscribe to the frame's load event.
    pub fn on_frame_loaded<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        if !self.is_destroyed() {
            self.listeners.lock().loaded.insert(id, Arc::new(handler));
        }
        id
    }

    /// Subscribe to inbound messages tagged `WIDGET_READY`.
    pub fn on_frame_ready<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&IncomingMessage) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        if !self.is_destroyed() {
            self.listeners.lock().ready.insert(id, Arc::new(handler));
        }
        id
    }

    /// Returns true if a listener was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        listeners.message.remove(&id).is_some()
            || listeners.loaded.remove(&id).is_some()
            || listeners.ready.remove(&id).is_some()
    }

    /// Feed the frame's load event into the channel.
    pub fn notify_loaded(&self) {
        // Handlers run outside the lock so they may re-enter the channel.
        let handlers: Vec<LoadHandler> = self.listeners.lock().loaded.values().cloned().collect();
        for handler in handlers {
            handler();
        }
    }

    /// Feed one inbound window message into the channel.
    pub fn deliver(&self, origin: impl Into<String>, payload: serde_json::Value) {
        let message = IncomingMessage::new(origin, payload);
        let is_ready = message.message_type() == Some(WIDGET_READY);

        let (on_message, on_ready) = {
            let listeners = self.listeners.lock();
            let on_message: Vec<MessageHandler> = listeners.message.values().cloned().collect();
            let on_ready: Vec<MessageHandler> = if is_ready {
                listeners.ready.values().cloned().collect()
            } else {
                Vec::new()
            };
            (on_message, on_ready)
        };

        for handler in on_ready {
            handler(&message);
        }
        for handler in on_message {
            handler(&message);
        }
    }

    /// Post a host message into the frame, scoped to `target_origin`.
    pub fn send(&self, message: &HostMessage, target_origin: &str) -> Result<(), ChannelError> {
        if self.is_destroyed() {
            return Err(ChannelError::Destroyed);
        }
        if target_origin.trim() == "*" {
            return Err(ChannelError::WildcardTarget);
        }

        let data =
            serde_json::to_string(message).map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.transport.post_message(&data, target_origin)
    }

    pub fn current_origin(&self) -> Option<String> {
        self.transport.current_origin()
    }

    /// Remove every listener. Idempotent.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.listeners.lock().clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// One message posted through a [`LoopbackFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub target_origin: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
struct LoopbackState {
    origin: Option<String>,
    delivered: Vec<PostedMessage>,
    dropped: usize,
}

/// In-memory frame for tests and headless hosts.
///
/// Mirrors browser delivery rules: a post reaches the frame only when the
/// target origin equals the frame's current origin, otherwise it is dropped
/// silently.
#[derive(Debug, Default)]
pub struct LoopbackFrame {
    state: Mutex<LoopbackState>,
}

impl LoopbackFrame {
    /// A frame with no content window yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame already showing a document from `origin`.
    pub fn loaded(origin: impl Into<String>) -> Self {
        let frame = Self::new();
        frame.navigate(origin);
        frame
    }

    pub fn navigate(&self, origin: impl Into<String>) {
        self.state.lock().origin = Some(origin.into());
    }

    /// Drop the content window, as when the frame element is removed.
    pub fn detach(&self) {
        self.state.lock().origin = None;
    }

    /// Messages that actually reached the frame.
    pub fn delivered(&self) -> Vec<PostedMessage> {
        self.state.lock().delivered.clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.state.lock().delivered.len()
    }

    /// Posts swallowed because the target origin did not match.
    pub fn dropped_count(&self) -> usize {
        self.state.lock().dropped
    }
}

impl FrameTransport for LoopbackFrame {
    fn post_message(&self, data: &str, target_origin: &str) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        let matches = match state.origin.as_deref() {
            None => return Err(ChannelError::FrameUnavailable),
            Some(current) => current == target_origin,
        };

        if matches {
            let payload =
                serde_json::from_str(data).map_err(|e| ChannelError::Encode(e.to_string()))?;
            state.delivered.push(PostedMessage {
                target_origin: target_origin.to_string(),
                payload,
            });
        } else {
            state.dropped += 1;
        }
        Ok(())
    }

    fn current_origin(&self) -> Option<String> {
        self.state.lock().origin.clone()
    }
}
