//! Arrival order, early completions and stale token results.

use super::harness::*;
use crate::error::TokenIssuanceError;
use crate::fsm::HandshakeState;
use crate::protocol::IncomingMessage;
use crate::token::OneTimeToken;
use serde_json::json;
use std::time::Duration;

fn completion(origin: &str) -> IncomingMessage {
    IncomingMessage::new(origin, json!({ "type": "EXCHANGE_COMPLETE" }))
}

#[tokio::test]
async fn early_completion_is_rechecked_after_delivery() {
    let harness = TestHarness::new();
    let mut session = harness.attached_session();

    assert!(session.on_frame_loaded());
    let pending = session.on_load_settled().unwrap();
    session.on_message(&completion(WIDGET_ORIGIN)).unwrap();
    assert_eq!(session.state(), HandshakeState::RequestingToken);

    run_request(&mut session, pending).await;
    assert_eq!(session.state(), HandshakeState::Acknowledged);
    assert_eq!(harness.frame.delivered_count(), 1);
}

#[tokio::test]
async fn early_completion_is_discarded_on_failure() {
    let harness = TestHarness::new();
    harness.issuer.queue_failure(TokenIssuanceError::Timeout);
    let mut session = harness.attached_session();

    assert!(session.on_frame_loaded());
    let pending = session.on_load_settled().unwrap();
    session.on_message(&completion(WIDGET_ORIGIN)).unwrap();
    run_request(&mut session, pending).await;
    assert_eq!(session.state(), HandshakeState::Failed);

    let pending = session.retry().unwrap();
    run_request(&mut session, pending).await;
    assert_eq!(session.state(), HandshakeState::Delivering);
}

#[test]
fn completion_before_any_request_is_ignored() {
    let harness = TestHarness::new();
    let mut session = harness.attached_session();

    session.on_message(&completion(WIDGET_ORIGIN)).unwrap();
    assert_eq!(session.state(), HandshakeState::AwaitingFrameSignal);
}

#[tokio::test]
async fn stale_generation_result_is_discarded() {
    let harness = TestHarness::new();
    harness.issuer.queue_failure(TokenIssuanceError::Timeout);
    let mut session = harness.attached_session();

    assert!(session.on_frame_loaded());
    let first = session.on_load_settled().unwrap();
    let stale_generation = first.generation();
    run_request(&mut session, first).await;

    let retry = session.retry().unwrap();
    assert!(retry.generation() > stale_generation);

    let late = OneTimeToken::new("late", 300).unwrap();
    session
        .complete_token_request(stale_generation, Ok(late))
        .unwrap();
    assert_eq!(session.state(), HandshakeState::RequestingToken);
    assert_eq!(harness.frame.delivered_count(), 0);

    run_request(&mut session, retry).await;
    assert_eq!(harness.delivered_tokens(), vec!["tok-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn completion_while_requesting_is_applied_in_order() {
    let harness = TestHarness::new();
    harness.issuer.set_delay(Duration::from_millis(200));
    let handle = harness.spawn();

    harness.ready();
    harness.complete();
    harness.complete_from(EVIL_ORIGIN);

    let snapshot = wait_for_state(&handle, HandshakeState::Acknowledged).await;
    assert_eq!(snapshot.attempt_count, 1);
    assert_eq!(harness.frame.delivered_count(), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn snapshots_follow_transition_order() {
    let harness = TestHarness::new();
    let handle = harness.spawn();
    let mut status = handle.subscribe();
    let mut seen = vec![status.borrow_and_update().state];

    harness.issuer.set_delay(Duration::from_millis(50));
    harness.ready();
    while seen.last() != Some(&HandshakeState::Delivering) {
        status.changed().await.unwrap();
        let state = status.borrow_and_update().state;
        if seen.last() != Some(&state) {
            seen.push(state);
        }
    }

    assert_eq!(
        seen,
        vec![
            HandshakeState::AwaitingFrameSignal,
            HandshakeState::RequestingToken,
            HandshakeState::Delivering,
        ]
    );
    handle.shutdown().await;
}
