//! Handshake state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────────┐
//! │        Idle         │ (initial)
//! └──────────┬──────────┘
//!            │ ChannelAttached
//!            ▼
//! ┌─────────────────────┐  AttemptsExhausted   ┌──────────┐
//! │ AwaitingFrameSignal │ ───────────────────► │  Failed  │
//! └──────────┬──────────┘                      └────┬─────┘
//!            │ FrameSignal        ▲                 │ Retry
//!            ▼                    │ DeliveryAborted │
//! ┌─────────────────────┐ ────────┘                 │
//! │   RequestingToken   │ ◄─────────────────────────┘
//! └──────────┬──────────┘ ── IssuanceFailed ──► Failed
//!            │ TokenDispatched
//!            ▼
//! ┌─────────────────────┐
//! │     Delivering      │
//! └──────────┬──────────┘
//!            │ ExchangeComplete
//!            ▼
//! ┌─────────────────────┐
//! │    Acknowledged     │
//! └─────────────────────┘
//!
//! Dispose => Disposed from every state.
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub handshake_machine(Idle)

    Idle => {
        ChannelAttached => AwaitingFrameSignal,
        Dispose => Disposed
    },
    AwaitingFrameSignal => {
        FrameSignal => RequestingToken,
        // Every attempt was spent without a successful delivery
        AttemptsExhausted => Failed,
        Dispose => Disposed
    },
    RequestingToken => {
        TokenDispatched => Delivering,
        IssuanceFailed => Failed,
        // Frame vanished or navigated away before the token could be sent
        DeliveryAborted => AwaitingFrameSignal,
        Dispose => Disposed
    },
    Delivering => {
        ExchangeComplete => Acknowledged,
        Dispose => Disposed
    },
    Acknowledged => {
        Dispose => Disposed
    },
    Failed => {
        Retry => RequestingToken,
        Dispose => Disposed
    },
    Disposed => {
        Dispose => Disposed
    }
}

pub use handshake_machine::Input as HandshakeMachineInput;
pub use handshake_machine::State as HandshakeMachineState;
pub use handshake_machine::StateMachine as HandshakeMachine;

/// Handshake state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    /// Session created, no channel attached yet.
    Idle,
    /// Waiting for the frame's load event or its readiness message.
    AwaitingFrameSignal,
    /// A token request is in flight.
    RequestingToken,
    /// Token posted to the frame, waiting for the exchange acknowledgement.
    Delivering,
    /// The widget confirmed the exchange.
    Acknowledged,
    /// Token issuance failed or attempts ran out. Retry is possible.
    Failed,
    /// Terminal. All listeners are gone.
    Disposed,
}

impl HandshakeState {
    /// Returns true once the widget has confirmed the exchange.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, HandshakeState::Acknowledged)
    }

    /// Returns true while a handshake is still expected to make progress on its own.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            HandshakeState::Idle
                | HandshakeState::AwaitingFrameSignal
                | HandshakeState::RequestingToken
                | HandshakeState::Delivering
        )
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, HandshakeState::Disposed)
    }
}

impl From<&HandshakeMachineState> for HandshakeState {
    fn from(state: &HandshakeMachineState) -> Self {
        match state {
            HandshakeMachineState::Idle => HandshakeState::Idle,
            HandshakeMachineState::AwaitingFrameSignal => HandshakeState::AwaitingFrameSignal,
            HandshakeMachineState::RequestingToken => HandshakeState::RequestingToken,
            HandshakeMachineState::Delivering => HandshakeState::Delivering,
            HandshakeMachineState::Acknowledged => HandshakeState::Acknowledged,
            HandshakeMachineState::Failed => HandshakeState::Failed,
            HandshakeMachineState::Disposed => HandshakeState::Disposed,
        }
    }
}
