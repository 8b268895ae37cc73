// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end conversations across reconnects, fallbacks, and credential changes.
//!
//! Each test builds an isolated TestHarness with a scripted socket and a mock
//! API. Tests are independent and run on a paused clock.

use std::time::Duration;

use parley_client::{ChannelState, ErrorKind, SessionEvent};
use parley_core::{MessageStatus, Sender};
use parley_test_utils::{settle, ConnectBehavior, MockConnector, TestHarness};
use secrecy::SecretString;
use serde_json::json;

// ---- Scenario 1: optimistic send survives a dropped channel ----

#[tokio::test(start_paused = true)]
async fn test_send_during_outage_then_resume_on_channel() {
    let harness = TestHarness::new();
    let first = harness.open().await;

    let over_channel = harness.client.send("one").await.unwrap();
    assert_eq!(over_channel.status, MessageStatus::Sent);

    first.close(Some(1006));
    harness
        .client
        .channel()
        .wait_for(|s| s.state == ChannelState::Disconnected)
        .await
        .unwrap();

    // While the channel is down the API carries the message.
    let fallback = harness.client.send("two").await.unwrap();
    assert_eq!(fallback.status, MessageStatus::Acknowledged);
    assert_eq!(harness.api.send_calls(), 1);

    // The channel comes back on its own and takes over again.
    let second = harness.connector.wait_for_socket(1).await;
    harness.client.channel().wait_for(|s| s.state.is_open()).await.unwrap();
    harness.client.send("three").await.unwrap();
    assert_eq!(second.sent_of_type("CHAT_MESSAGE").len(), 1);
    assert_eq!(harness.api.send_calls(), 1);

    let texts: Vec<String> = harness
        .client
        .messages()
        .into_iter()
        .filter(|m| m.sender == Sender::User)
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, ["one", "two", "three"]);

    harness.client.shutdown().await;
}

// ---- Scenario 2: duplicate inbound delivery ----

#[tokio::test(start_paused = true)]
async fn test_redelivery_after_reconnect_is_stored_once() {
    let harness = TestHarness::new();
    let first = harness.open().await;

    let reply = json!({"type": "CHAT_MESSAGE", "message": {"id": "a1", "text": "welcome back"}});
    first.push_json(reply.clone());
    settle().await;
    first.close(Some(4001));

    let second = harness.connector.wait_for_socket(1).await;
    second.push_json(reply);
    second.push_json(json!({"type": "CHAT_MESSAGE", "payload": {"id": "a2", "text": "new"}}));
    settle().await;

    let ids: Vec<String> = harness.client.messages().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, ["a1", "a2"]);

    harness.client.shutdown().await;
}

// ---- Scenario 3: credential refresh carries into the next connection ----

#[tokio::test(start_paused = true)]
async fn test_refreshed_credential_used_on_reconnect() {
    let harness = TestHarness::new();
    let first = harness.open().await;

    first.push_json(json!({"type": "TOKEN_REFRESH", "payload": "t2"}));
    first.wait_for_sent("TOKEN_REFRESH_ACK", 1).await;
    assert_eq!(harness.stored_token().as_deref(), Some("t2"));

    first.close(Some(1011));
    let second = harness.connector.wait_for_socket(1).await;
    let auth = second.wait_for_sent("AUTH", 1).await;
    assert_eq!(auth[0]["token"], "t2");

    // No second ack on the new connection.
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(second.sent_of_type("TOKEN_REFRESH_ACK").is_empty());
    assert_eq!(first.sent_of_type("TOKEN_REFRESH_ACK").len(), 1);

    harness.client.shutdown().await;
}

// ---- Scenario 4: session expiry then a fresh login ----

#[tokio::test(start_paused = true)]
async fn test_expired_session_recovers_through_login() {
    let harness = TestHarness::new();
    let mut rx = harness.events();
    let first = harness.open().await;

    harness.client.send("before").await.unwrap();
    first.push_json(json!({"type": "SYSTEM_MESSAGE", "payload": "Session expired"}));
    loop {
        if matches!(rx.recv().await.unwrap(), SessionEvent::LoggedOut) {
            break;
        }
    }
    assert!(harness.client.messages().is_empty());
    assert_eq!(harness.stored_token(), None);

    let password = SecretString::from("pw".to_string());
    harness.client.login("ada", &password).await.unwrap();
    let second = harness.connector.wait_for_socket(1).await;
    let auth = second.wait_for_sent("AUTH", 1).await;
    assert_eq!(auth[0]["token"], "mock-token");
    harness.client.channel().wait_for(|s| s.state.is_open()).await.unwrap();

    harness.client.send("after").await.unwrap();
    assert_eq!(harness.client.messages().len(), 1);
    assert_eq!(second.sent_of_type("CHAT_MESSAGE")[0]["message"], "after");

    harness.client.shutdown().await;
}

// ---- Scenario 5: backoff exhaustion, fallback keeps working ----

#[tokio::test(start_paused = true)]
async fn test_exhausted_channel_still_delivers_over_api() {
    let connector = MockConnector::refusing();
    connector.script([ConnectBehavior::Accept]);
    let harness = TestHarness::builder().with_connector(connector).build();
    let socket = harness.open().await;

    socket.close(Some(1006));
    harness
        .client
        .channel()
        .wait_for(|s| s.state == ChannelState::Disconnected && s.attempts == 5 && s.next_delay.is_none())
        .await
        .unwrap();
    let error = harness.state().error().unwrap();
    assert_eq!(error.kind, ErrorKind::ReconnectExhausted);
    assert!(error.fatal);

    let sent = harness.client.send("still here").await.unwrap();
    assert_eq!(sent.status, MessageStatus::Acknowledged);
    assert_eq!(harness.client.messages().last().unwrap().text, "echo: still here");

    harness.client.shutdown().await;
}
