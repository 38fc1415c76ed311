//! Cross-context message shapes.
//!
//! Host → widget: `{"type": "TOKEN_DELIVERED", "ott": "..."}`
//! Widget → host: `{"type": "WIDGET_READY"}`, `{"type": "EXCHANGE_COMPLETE"}`

use crate::error::HandshakeError;
use crate::token::OneTimeToken;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOKEN_DELIVERED: &str = "TOKEN_DELIVERED";
pub const WIDGET_READY: &str = "WIDGET_READY";
pub const EXCHANGE_COMPLETE: &str = "EXCHANGE_COMPLETE";

/// Message posted from the host into the widget frame.
#[derive(Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "TOKEN_DELIVERED")]
    TokenDelivered { ott: String },
}

impl HostMessage {
    /// Wrap a token for delivery, consuming it.
    pub fn token_delivered(token: OneTimeToken) -> Self {
        HostMessage::TokenDelivered {
            ott: token.into_value(),
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            HostMessage::TokenDelivered { .. } => TOKEN_DELIVERED,
        }
    }
}

impl fmt::Debug for HostMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostMessage::TokenDelivered { ott } => f
                .debug_struct("TokenDelivered")
                .field("ott_len", &ott.len())
                .finish(),
        }
    }
}

/// Message the widget frame may send to the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetMessage {
    WidgetReady,
    ExchangeComplete,
}

/// One inbound message as observed by the channel, with its sender origin.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub origin: String,
    pub payload: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(origin: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            payload,
        }
    }

    /// The payload's `type` tag, if present and a string.
    pub fn message_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(|t| t.as_str())
    }

    /// Interpret the payload as a widget protocol message.
    pub fn parse(&self) -> Result<WidgetMessage, HandshakeError> {
        if !self.payload.is_object() {
            return Err(HandshakeError::ProtocolViolation(
                "payload is not an object".to_string(),
            ));
        }
        match self.message_type() {
            None => Err(HandshakeError::ProtocolViolation(
                "missing type tag".to_string(),
            )),
            Some(WIDGET_READY) | Some(EXCHANGE_COMPLETE) => {
                serde_json::from_value(self.payload.clone())
                    .map_err(|e| HandshakeError::ProtocolViolation(e.to_string()))
            }
            Some(other) => Err(HandshakeError::ProtocolViolation(format!(
                "unknown message type: {}",
                truncate(other, 64)
            ))),
        }
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_delivered_wire_shape() {
        let token = OneTimeToken::new("abc123", 300).unwrap();
        let message = HostMessage::token_delivered(token);
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "type": "TOKEN_DELIVERED", "ott": "abc123" })
        );
        assert_eq!(message.message_type(), TOKEN_DELIVERED);
    }

    #[test]
    fn test_host_message_debug_hides_token() {
        let message = HostMessage::TokenDelivered {
            ott: "abc123".to_string(),
        };
        assert!(!format!("{:?}", message).contains("abc123"));
    }

    #[test]
    fn test_parse_widget_messages() {
        let ready = IncomingMessage::new("https://w.example", json!({ "type": "WIDGET_READY" }));
        assert_eq!(ready.parse().unwrap(), WidgetMessage::WidgetReady);

        let done = IncomingMessage::new(
            "https://w.example",
            json!({ "type": "EXCHANGE_COMPLETE", "session": "s-1" }),
        );
        assert_eq!(done.parse().unwrap(), WidgetMessage::ExchangeComplete);
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        for payload in [
            json!("WIDGET_READY"),
            json!({ "kind": "WIDGET_READY" }),
            json!({ "type": 7 }),
            json!({ "type": "UT_OTT", "ott": "x" }),
            json!(null),
        ] {
            let message = IncomingMessage::new("https://w.example", payload);
            assert!(matches!(
                message.parse(),
                Err(HandshakeError::ProtocolViolation(_))
            ));
        }
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("ééé", 2), "éé");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
