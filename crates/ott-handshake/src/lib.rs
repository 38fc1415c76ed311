//! One-time token handshake between a host page and an embedded widget frame.
//!
//! The host requests a short-lived, single-use token from its backend and
//! posts it into the widget frame, scoped to the widget's exact origin. The
//! widget confirms the exchange with `EXCHANGE_COMPLETE`.
//!
//! # Core Invariants
//!
//! 1. **Exact Origins**: inbound messages count only if their origin equals the
//!    widget origin byte for byte; tokens are posted to that origin only
//! 2. **One Token Per Generation**: load and ready signals merge first-wins;
//!    a second token is only ever requested by an explicit retry
//! 3. **Fresh On Retry**: tokens are never cached or re-sent
//! 4. **Disposal Is Final**: after dispose, no callback or late result has any effect
//!
//! # Architecture
//!
//! ```text
//! frame load / WIDGET_READY ──► ChildFrameChannel ──► driver task ──► HandshakeSession
//!                                     ▲                                 │
//!                                     └──── TOKEN_DELIVERED ◄── TokenIssuer
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod fsm;
pub mod issuer;
pub mod origin;
pub mod protocol;
pub mod session;
pub mod token;

#[cfg(test)]
mod tests;

pub use channel::{ChildFrameChannel, FrameTransport, ListenerId, LoopbackFrame, PostedMessage};
pub use driver::{connect_channel, spawn_session, SessionEvent, SessionHandle};
pub use error::{
    ChannelError, EndpointError, ErrorKind, HandshakeError, HandshakeResult, TokenIssuanceError,
};
pub use fsm::HandshakeState;
pub use issuer::{HttpTokenIssuer, TokenIssuer, DEFAULT_REQUEST_TIMEOUT};
pub use origin::{is_trusted, normalize_origin, origin_of, WidgetEndpoint};
pub use protocol::{HostMessage, IncomingMessage, WidgetMessage};
pub use session::{
    HandshakeSession, HandshakeSnapshot, PendingToken, SessionConfig, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_SETTLE_DELAY,
};
pub use token::OneTimeToken;
