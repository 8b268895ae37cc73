// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel lifecycle and session protocol over a mock socket.
//!
//! Every test runs on a paused clock, so backoff and safety timers elapse
//! instantly while their ordering stays exact.

use std::time::Duration;

use parley_client::{ChannelState, ErrorKind, SessionEvent, VisibleError};
use parley_test_utils::{settle, ConnectBehavior, MockConnector, TestHarness};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::Instant;

async fn next_error(rx: &mut broadcast::Receiver<SessionEvent>) -> VisibleError {
    loop {
        match rx.recv().await.expect("session state alive") {
            SessionEvent::ErrorRaised(error) => return error,
            _ => continue,
        }
    }
}

async fn wait_for_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut predicate: impl FnMut(&SessionEvent) -> bool,
) {
    loop {
        let event = rx.recv().await.expect("session state alive");
        if predicate(&event) {
            return;
        }
    }
}

// ---- Lifecycle ----

#[tokio::test(start_paused = true)]
async fn test_open_authenticates_with_stored_credential() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    let auth = socket.sent_of_type("AUTH");
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0], json!({"type": "AUTH", "token": "t1"}));
    assert!(harness.state().is_connected());
    assert_eq!(
        harness.client.status().state,
        ChannelState::Open { authenticated: false }
    );

    socket.push_json(json!({"type": "AUTH_SUCCESS"}));
    let status = harness
        .client
        .channel()
        .wait_for(|s| s.state == ChannelState::Open { authenticated: true })
        .await
        .unwrap();
    assert_eq!(status.attempts, 0);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_frame_omits_token_without_credential() {
    let harness = TestHarness::builder().with_token(None).build();
    let socket = harness.open().await;
    assert_eq!(socket.sent_of_type("AUTH")[0], json!({"type": "AUTH"}));
    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_failed_raises_error_and_keeps_socket() {
    let harness = TestHarness::new();
    let mut rx = harness.events();
    let socket = harness.open().await;

    socket.push_json(json!({"type": "AUTH_FAILED", "message": "bad token"}));
    let error = next_error(&mut rx).await;
    assert_eq!(error.kind, ErrorKind::Authentication);
    assert_eq!(error.message, "WebSocket authentication failed");
    assert_eq!(
        harness.client.status().state,
        ChannelState::Open { authenticated: false }
    );

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_open_is_a_no_op() {
    let harness = TestHarness::new();
    harness.open().await;

    harness.client.connect().unwrap();
    settle().await;
    assert_eq!(harness.connector.attempts(), 1);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_intentional_disconnect_closes_normally_and_stays_down() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    harness.client.disconnect().await.unwrap();
    assert_eq!(socket.client_close_code(), Some(Some(1000)));
    assert_eq!(harness.client.status().state, ChannelState::Disconnected);
    assert!(!harness.state().is_connected());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(harness.connector.attempts(), 1);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_normal_close_does_not_reconnect() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    socket.close(Some(1000));
    harness
        .client
        .channel()
        .wait_for(|s| s.state == ChannelState::Disconnected)
        .await
        .unwrap();
    assert!(!harness.state().is_connected());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.connector.attempts(), 1);
    assert!(harness.state().error().is_none());

    harness.client.shutdown().await;
}

// ---- Reconnect ----

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_reconnects_after_base_delay() {
    let harness = TestHarness::new();
    let first = harness.open().await;

    let closed_at = Instant::now();
    first.close(Some(4000));
    let second = harness.connector.wait_for_socket(1).await;
    let elapsed = closed_at.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "reconnected after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "reconnected after {elapsed:?}");

    // The new connection authenticates again.
    second.wait_for_sent("AUTH", 1).await;
    harness
        .client
        .channel()
        .wait_for(|s| s.state.is_open() && s.attempts == 0)
        .await
        .unwrap();

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropped_stream_counts_as_abnormal_close() {
    let harness = TestHarness::new();
    let first = harness.open().await;

    first.drop_connection();
    harness.connector.wait_for_socket(1).await;
    assert_eq!(harness.connector.attempts(), 2);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_doubles_then_gives_up() {
    let connector = MockConnector::refusing();
    connector.script([ConnectBehavior::Accept]);
    let harness = TestHarness::builder().with_connector(connector).build();
    let mut rx = harness.events();
    let socket = harness.open().await;

    let closed_at = Instant::now();
    socket.close(Some(1006));
    let error = next_error(&mut rx).await;
    let elapsed = closed_at.elapsed();

    assert_eq!(error.kind, ErrorKind::ReconnectExhausted);
    assert!(error.fatal);
    assert_eq!(error.message, "WebSocket connection failed after multiple attempts");
    // 1s + 2s + 4s + 8s + 16s of backoff before the last refused attempt.
    assert!(elapsed >= Duration::from_secs(31), "gave up after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(32), "gave up after {elapsed:?}");
    assert_eq!(harness.connector.attempts(), 6);

    let status = harness.client.status();
    assert_eq!(status.state, ChannelState::Disconnected);
    assert_eq!(status.next_delay, None);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(harness.connector.attempts(), 6);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_after_exhaustion_starts_fresh() {
    let connector = MockConnector::refusing();
    let harness = TestHarness::builder().with_connector(connector).build();
    let mut rx = harness.events();

    harness.client.connect().unwrap();
    next_error(&mut rx).await;
    assert_eq!(harness.connector.attempts(), 6);

    harness.connector.script([ConnectBehavior::Accept]);
    harness.open().await;
    assert_eq!(harness.connector.attempts(), 7);
    assert_eq!(harness.client.status().attempts, 0);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_aborts_and_retries() {
    let connector = MockConnector::new();
    connector.script([ConnectBehavior::Hang]);
    let harness = TestHarness::builder().with_connector(connector).build();

    let started = Instant::now();
    harness.open().await;
    let elapsed = started.elapsed();

    // 10s handshake timeout, then the 1s base backoff.
    assert!(elapsed >= Duration::from_secs(11), "opened after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(12), "opened after {elapsed:?}");
    assert_eq!(harness.connector.attempts(), 2);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_backoff_cancels_reconnect() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    socket.close(Some(4000));
    harness
        .client
        .channel()
        .wait_for(|s| s.next_delay.is_some())
        .await
        .unwrap();
    harness.client.disconnect().await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.connector.attempts(), 1);

    harness.client.shutdown().await;
}

// ---- Inbound frames ----

#[tokio::test(start_paused = true)]
async fn test_duplicate_inbound_message_is_stored_once() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    let frame = json!({"type": "CHAT_MESSAGE", "payload": {"id": "m1", "text": "hello"}});
    socket.push_json(frame.clone());
    socket.push_json(frame);
    socket.push_json(json!({"id": "m2", "text": "bare"}));
    settle().await;

    let messages = harness.client.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "m1");
    assert_eq!(messages[0].text, "hello");
    assert_eq!(messages[1].text, "bare");

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_typing_indicator_cleared_by_message() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    socket.push_json(json!({"type": "TYPING_START"}));
    settle().await;
    assert!(harness.state().is_typing("assistant"));

    socket.push_json(json!({"type": "CHAT_MESSAGE", "payload": {"id": "m1", "text": "done"}}));
    settle().await;
    assert!(!harness.state().is_typing("assistant"));

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_dropped() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    socket.push_text("{not json");
    socket.push_json(json!({"type": "TOKEN_REFRESH"}));
    socket.push_json(json!({"type": "SOMETHING_NEW", "payload": 1}));
    settle().await;

    assert!(harness.client.messages().is_empty());
    assert_eq!(harness.live_token().as_deref(), Some("t1"));
    assert!(harness.client.status().state.is_open());

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_error_frame_is_visible() {
    let harness = TestHarness::new();
    let mut rx = harness.events();
    let socket = harness.open().await;

    socket.push_json(json!({"type": "ERROR_MESSAGE", "payload": "rate limited"}));
    let error = next_error(&mut rx).await;
    assert_eq!(error.kind, ErrorKind::Server);
    assert_eq!(error.message, "rate limited");
    assert!(!error.fatal);

    harness.client.shutdown().await;
}

// ---- Credential refresh ----

#[tokio::test(start_paused = true)]
async fn test_token_refresh_stores_and_acks_once() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    socket.push_json(json!({"type": "TOKEN_REFRESH", "payload": "t2"}));
    let acks = socket.wait_for_sent("TOKEN_REFRESH_ACK", 1).await;
    assert!(acks[0]["timestamp"].is_i64());
    assert_eq!(harness.live_token().as_deref(), Some("t2"));
    assert_eq!(harness.stored_token().as_deref(), Some("t2"));

    // Past the safety window: the timer was disarmed, no resend.
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(socket.sent_of_type("TOKEN_REFRESH_ACK").len(), 1);
    assert!(harness.state().error().is_none());

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsent_ack_is_resent_by_safety_timer() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    socket.fail_sends(true);
    let refreshed_at = Instant::now();
    socket.push_json(json!({"type": "TOKEN_REFRESH", "payload": "t2"}));
    settle().await;
    assert_eq!(harness.stored_token().as_deref(), Some("t2"));
    assert!(socket.sent_of_type("TOKEN_REFRESH_ACK").is_empty());

    socket.fail_sends(false);
    socket.wait_for_sent("TOKEN_REFRESH_ACK", 1).await;
    assert!(refreshed_at.elapsed() >= Duration::from_secs(120));

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(socket.sent_of_type("TOKEN_REFRESH_ACK").len(), 1);
    assert!(harness.state().error().is_none());

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ack_failing_twice_raises_token_ack_error() {
    let harness = TestHarness::new();
    let mut rx = harness.events();
    let socket = harness.open().await;

    socket.fail_sends(true);
    socket.push_json(json!({"type": "TOKEN_REFRESH", "payload": "t2"}));
    let error = next_error(&mut rx).await;

    assert_eq!(error.kind, ErrorKind::TokenAck);
    assert_eq!(error.message, "Failed to acknowledge credential refresh");
    // The new credential is kept even though the ack never went out.
    assert_eq!(harness.live_token().as_deref(), Some("t2"));

    harness.client.shutdown().await;
}

// ---- Session expiry ----

#[tokio::test(start_paused = true)]
async fn test_session_expired_tears_everything_down() {
    let harness = TestHarness::new();
    let mut rx = harness.events();
    let socket = harness.open().await;

    socket.push_json(json!({"type": "CHAT_MESSAGE", "payload": {"id": "m1", "text": "hi"}}));
    socket.push_json(json!({"type": "SYSTEM_MESSAGE", "payload": "Session expired, please log in again"}));
    wait_for_event(&mut rx, |e| matches!(e, SessionEvent::LoggedOut)).await;

    assert_eq!(socket.client_close_code(), Some(Some(1000)));
    assert_eq!(harness.client.status().state, ChannelState::Disconnected);
    assert!(!harness.state().is_connected());
    assert!(harness.client.messages().is_empty());
    assert_eq!(harness.live_token(), None);
    assert_eq!(harness.stored_token(), None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.connector.attempts(), 1);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_other_system_messages_are_informational() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    socket.push_json(json!({"type": "SYSTEM_MESSAGE", "payload": "maintenance at noon"}));
    settle().await;
    assert!(harness.client.status().state.is_open());
    assert_eq!(harness.live_token().as_deref(), Some("t1"));

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_open_socket() {
    let harness = TestHarness::new();
    let socket = harness.open().await;
    let state = harness.state().clone();

    harness.client.shutdown().await;
    assert_eq!(socket.client_close_code(), Some(Some(1000)));
    assert!(!state.is_connected());
}
