//! Widget host: embeds the widget frame for a signed-in host user and runs
//! the one-time token handshake for each frame instance.

pub mod error;
pub mod session_client;
pub mod shell;

#[cfg(test)]
mod tests;

pub use error::{HostError, HostResult};
pub use session_client::{HostUser, LoginStart, SessionBackend, SessionClient, SessionStatus};
pub use shell::{view_for, FrameMount, HostShell, WidgetView};
