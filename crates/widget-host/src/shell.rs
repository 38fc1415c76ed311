//! Host shell: page lifecycle around the handshake.
//!
//! The shell checks the host session once at boot, mounts at most one widget
//! frame at a time, and turns handshake snapshots into a [`WidgetView`] for
//! the UI. Origin and protocol violations never reach the view.

use crate::error::{HostError, HostResult};
use crate::session_client::{HostUser, SessionBackend, SessionClient, SessionStatus};
use host_config::HostConfig;
use ott_handshake::{
    spawn_session, ChildFrameChannel, FrameTransport, HandshakeSession, HandshakeSnapshot,
    HandshakeState, HttpTokenIssuer, SessionHandle, TokenIssuer, WidgetEndpoint,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// What the UI layer should show for the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WidgetView {
    /// No host session; the widget cannot be opened.
    SignedOut,
    /// Handshake in progress.
    Loading,
    /// The widget confirmed the token exchange.
    Ready,
    /// Token issuance failed.
    Unavailable { can_retry: bool },
    /// Signed in, no frame mounted.
    Closed,
}

/// Map a handshake snapshot to the view shown for it.
pub fn view_for(snapshot: &HandshakeSnapshot, max_attempts: u32) -> WidgetView {
    match snapshot.state {
        HandshakeState::Idle
        | HandshakeState::AwaitingFrameSignal
        | HandshakeState::RequestingToken
        | HandshakeState::Delivering => WidgetView::Loading,
        HandshakeState::Acknowledged => WidgetView::Ready,
        HandshakeState::Failed => WidgetView::Unavailable {
            can_retry: snapshot.attempt_count < max_attempts,
        },
        HandshakeState::Disposed => WidgetView::Closed,
    }
}

/// The channel a caller feeds frame events into after mounting.
#[derive(Clone)]
pub struct FrameMount {
    pub frame_id: Uuid,
    pub channel: Arc<ChildFrameChannel>,
}

struct MountedFrame {
    frame_id: Uuid,
    handle: SessionHandle,
    forwarder: JoinHandle<()>,
}

/// Composes session check, frame lifecycle and the handshake.
pub struct HostShell {
    config: HostConfig,
    endpoint: WidgetEndpoint,
    host_origin: String,
    backend: Arc<dyn SessionBackend>,
    issuer: Arc<dyn TokenIssuer>,
    user: Mutex<Option<HostUser>>,
    mounted: Mutex<Option<MountedFrame>>,
    /// Serializes mount, unmount and sign-out.
    lifecycle: tokio::sync::Mutex<()>,
    view: Arc<watch::Sender<WidgetView>>,
    frame_generation: Arc<AtomicU64>,
}

impl HostShell {
    /// Build a shell from validated configuration and explicit collaborators.
    pub fn new(
        config: HostConfig,
        backend: Arc<dyn SessionBackend>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> HostResult<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let host_origin = config.normalized_host_origin()?;
        let (view, _) = watch::channel(WidgetView::SignedOut);

        Ok(Self {
            config,
            endpoint,
            host_origin,
            backend,
            issuer,
            user: Mutex::new(None),
            mounted: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            view: Arc::new(view),
            frame_generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Build a shell talking HTTP to the configured backend.
    pub fn from_config(config: HostConfig, session_cookie: Option<String>) -> HostResult<Self> {
        config.validate()?;
        let mut backend = SessionClient::new(&config)?;
        let mut issuer = HttpTokenIssuer::new(
            config.token_issuer_url()?,
            config.normalized_host_origin()?,
            config.request_timeout(),
        )?;
        if let Some(cookie) = session_cookie {
            backend = backend.with_session_cookie(cookie.clone());
            issuer = issuer.with_session_cookie(cookie);
        }
        Self::new(config, Arc::new(backend), Arc::new(issuer))
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn view(&self) -> WidgetView {
        *self.view.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WidgetView> {
        self.view.subscribe()
    }

    pub fn user(&self) -> Option<HostUser> {
        self.user.lock().clone()
    }

    pub fn frame_id(&self) -> Option<Uuid> {
        self.mounted.lock().as_ref().map(|m| m.frame_id)
    }

    pub fn handshake_snapshot(&self) -> Option<HandshakeSnapshot> {
        self.mounted.lock().as_ref().map(|m| m.handle.snapshot())
    }

    /// Check the host session once at page load.
    pub async fn boot(&self) -> HostResult<SessionStatus> {
        let status = self.backend.check_session().await?;
        *self.user.lock() = status.user().cloned();
        let view = if status.is_authenticated() {
            WidgetView::Closed
        } else {
            WidgetView::SignedOut
        };
        self.view.send_replace(view);
        Ok(status)
    }

    /// Create the channel and handshake session for a new frame instance.
    ///
    /// Replaces any frame that is already mounted.
    pub async fn mount_frame(&self, transport: Arc<dyn FrameTransport>) -> HostResult<FrameMount> {
        let _lifecycle = self.lifecycle.lock().await;
        let signed_in = self.user.lock().is_some();
        if !signed_in {
            return Err(HostError::NotAuthenticated);
        }
        self.teardown_frame().await;

        let channel = Arc::new(ChildFrameChannel::new(transport));
        let session = HandshakeSession::new(
            self.endpoint.clone(),
            self.host_origin.clone(),
            Arc::clone(&self.issuer),
            Arc::clone(&channel),
            self.config.session_config(),
        );
        let frame_id = session.frame_id();
        let handle = spawn_session(session, &channel);

        let generation = self.frame_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.view.send_replace(WidgetView::Loading);
        let forwarder = self.spawn_forwarder(handle.subscribe(), generation);

        info!(frame_id = %frame_id, widget_id = %self.endpoint.widget_id(), "Widget frame mounted");
        *self.mounted.lock() = Some(MountedFrame {
            frame_id,
            handle,
            forwarder,
        });

        Ok(FrameMount { frame_id, channel })
    }

    fn spawn_forwarder(
        &self,
        mut status: watch::Receiver<HandshakeSnapshot>,
        generation: u64,
    ) -> JoinHandle<()> {
        let view = Arc::clone(&self.view);
        let current = Arc::clone(&self.frame_generation);
        let max_attempts = self.config.max_attempts;

        tokio::spawn(async move {
            loop {
                let next = view_for(&status.borrow_and_update(), max_attempts);
                // Writes from a replaced frame are dropped under the view lock.
                view.send_if_modified(|shown| {
                    if current.load(Ordering::SeqCst) != generation || *shown == next {
                        return false;
                    }
                    *shown = next;
                    true
                });
                if status.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Dispose the mounted frame's session. Returns false if nothing was mounted.
    pub async fn unmount_frame(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown_frame().await
    }

    async fn teardown_frame(&self) -> bool {
        let mounted = self.mounted.lock().take();
        let Some(mounted) = mounted else {
            return false;
        };

        self.frame_generation.fetch_add(1, Ordering::SeqCst);
        mounted.forwarder.abort();
        mounted.handle.shutdown().await;

        let view = if self.user.lock().is_some() {
            WidgetView::Closed
        } else {
            WidgetView::SignedOut
        };
        self.view.send_replace(view);
        info!(frame_id = %mounted.frame_id, "Widget frame unmounted");
        true
    }

    /// Forward the user's retry affordance to the mounted session.
    pub fn retry(&self) -> HostResult<()> {
        let guard = self.mounted.lock();
        let mounted = guard.as_ref().ok_or(HostError::NoFrame)?;
        mounted.handle.retry()?;
        Ok(())
    }

    /// Tear down the frame, then end the backend session.
    pub async fn sign_out(&self) -> HostResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown_frame().await;
        let result = self.backend.logout().await;
        if let Err(e) = &result {
            warn!(error = %e, "Backend logout failed, clearing local session anyway");
        }
        *self.user.lock() = None;
        self.view.send_replace(WidgetView::SignedOut);
        result
    }

    /// Ask the backend where to start the identity provider's login.
    pub async fn start_login(&self) -> HostResult<String> {
        Ok(self.backend.start_login().await?.auth_url)
    }
}
