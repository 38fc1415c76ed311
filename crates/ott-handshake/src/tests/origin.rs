//! Messages from anywhere but the widget origin never advance the session.

use super::harness::*;
use crate::error::HandshakeError;
use crate::fsm::HandshakeState;
use crate::protocol::IncomingMessage;
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn ready_from_evil_origin_is_dropped() {
    let harness = TestHarness::new();
    let handle = harness.spawn();

    harness.ready_from(EVIL_ORIGIN);
    flush().await;

    assert_eq!(handle.snapshot().state, HandshakeState::AwaitingFrameSignal);
    assert_eq!(handle.snapshot().last_error, None);
    assert_eq!(harness.issuer.call_count(), 0);
    handle.shutdown().await;
}

#[test]
fn lookalike_origins_return_origin_mismatch() {
    let harness = TestHarness::new();
    let mut session = harness.attached_session();

    for origin in [
        EVIL_ORIGIN,
        "https://widget.example.com.evil.example",
        "http://widget.example.com",
        "https://widget.example.com:444",
        "null",
    ] {
        let ready = IncomingMessage::new(origin, json!({ "type": "WIDGET_READY" }));
        assert_eq!(
            session.on_frame_ready(&ready).unwrap_err(),
            HandshakeError::OriginMismatch {
                origin: origin.to_string()
            }
        );
    }
    assert_eq!(session.state(), HandshakeState::AwaitingFrameSignal);
    assert_eq!(harness.issuer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn completion_from_evil_origin_does_not_acknowledge() {
    let harness = TestHarness::new();
    let handle = harness.spawn();

    harness.ready();
    wait_for_state(&handle, HandshakeState::Delivering).await;
    harness.complete_from(EVIL_ORIGIN);
    flush().await;

    assert_eq!(handle.snapshot().state, HandshakeState::Delivering);
    handle.shutdown().await;
}

#[test]
fn malformed_messages_are_protocol_violations() {
    let harness = TestHarness::new();
    let mut session = harness.attached_session();

    for payload in [json!("hello"), json!({ "type": "UNKNOWN" }), json!({})] {
        let message = IncomingMessage::new(WIDGET_ORIGIN, payload);
        assert!(matches!(
            session.on_message(&message),
            Err(HandshakeError::ProtocolViolation(_))
        ));
    }
    assert_eq!(session.state(), HandshakeState::AwaitingFrameSignal);
    assert_eq!(session.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn frame_navigated_away_gets_no_token() {
    let harness = TestHarness::new();
    harness.issuer.set_delay(Duration::from_secs(1));
    let handle = harness.spawn();

    harness.ready();
    wait_for_state(&handle, HandshakeState::RequestingToken).await;
    harness.frame.navigate(EVIL_ORIGIN);

    let snapshot = wait_until(&handle, |s| {
        s.state == HandshakeState::AwaitingFrameSignal && s.attempt_count == 1
    })
    .await;
    assert!(snapshot.last_error.is_some());
    assert_eq!(harness.frame.delivered_count(), 0);
    assert_eq!(harness.frame.dropped_count(), 0);

    // Returning to the widget restarts the handshake with a fresh token.
    harness.frame.navigate(WIDGET_ORIGIN);
    harness.ready();
    wait_for_state(&handle, HandshakeState::Delivering).await;
    assert_eq!(harness.delivered_tokens(), vec!["tok-2".to_string()]);
    handle.shutdown().await;
}

#[tokio::test]
async fn attempts_exhausted_by_aborted_deliveries_fail_the_session() {
    let harness = TestHarness::with_frame(crate::channel::LoopbackFrame::new());
    let mut session = harness.attached_session();

    for _ in 0..3 {
        assert!(session.on_frame_loaded());
        let pending = session.on_load_settled().unwrap();
        run_request(&mut session, pending).await;
        assert_eq!(session.state(), HandshakeState::AwaitingFrameSignal);
    }

    assert!(session.on_frame_loaded());
    assert!(session.on_load_settled().is_none());
    assert_eq!(session.state(), HandshakeState::Failed);
    assert_eq!(harness.issuer.call_count(), 3);
}
