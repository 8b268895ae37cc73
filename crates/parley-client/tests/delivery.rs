// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery: optimistic insert, channel first, API fallback, retry.

use chrono::{TimeZone, Utc};
use parley_client::{ErrorKind, SessionEvent};
use parley_core::{Message, MessageStatus, SendReceipt, Sender};
use parley_test_utils::{settle, ApiReply, MockApi, TestHarness};
use secrecy::SecretString;
use serde_json::json;

// ---- Channel path ----

#[tokio::test(start_paused = true)]
async fn test_send_over_open_channel() {
    let harness = TestHarness::new();
    let socket = harness.open().await;

    let sent = harness.client.send("hello").await.unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.sender, Sender::User);
    let key = sent.idempotency_key.clone().unwrap();
    assert!(key.starts_with("msg_"));

    let frames = socket.sent_of_type("CHAT_MESSAGE");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["message"], "hello");
    assert_eq!(frames[0]["idempotencyKey"], key.as_str());
    assert_eq!(harness.api.send_calls(), 0);

    // The server's echo carries the same key and is not stored twice.
    socket.push_json(json!({
        "type": "CHAT_MESSAGE",
        "payload": {"id": "srv_9", "idempotencyKey": key, "sender": "user", "text": "hello"}
    }));
    socket.push_json(json!({"type": "MESSAGE_STATUS_UPDATE", "messageId": sent.id, "status": "acknowledged"}));
    settle().await;

    let messages = harness.client.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, MessageStatus::Acknowledged);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_message_is_visible_before_delivery_completes() {
    let harness = TestHarness::new();
    let mut rx = harness.events();

    harness.client.send("first").await.unwrap();
    match rx.recv().await.unwrap() {
        SessionEvent::MessageAdded(message) => {
            assert_eq!(message.text, "first");
            assert_eq!(message.status, MessageStatus::Sent);
        }
        other => panic!("expected MessageAdded first, got {other:?}"),
    }

    harness.client.shutdown().await;
}

// ---- Fallback path ----

#[tokio::test(start_paused = true)]
async fn test_send_falls_back_to_api_when_disconnected() {
    let harness = TestHarness::new();

    let sent = harness.client.send("hi").await.unwrap();
    assert_eq!(sent.status, MessageStatus::Acknowledged);
    assert_eq!(sent.id, "srv_1");

    let (text, key) = harness.api.sends().await.remove(0);
    assert_eq!(text, "hi");
    assert_eq!(Some(key), sent.idempotency_key);

    let messages = harness.client.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].id, "reply_srv_1");
    assert_eq!(messages[1].sender, Sender::Assistant);
    assert_eq!(messages[1].status, MessageStatus::Received);
    assert_eq!(messages[1].text, "echo: hi");

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_falls_back_when_channel_write_fails() {
    let harness = TestHarness::new();
    let socket = harness.open().await;
    socket.fail_sends(true);

    let sent = harness.client.send("hi").await.unwrap();
    assert_eq!(sent.status, MessageStatus::Acknowledged);
    assert_eq!(harness.api.send_calls(), 1);
    assert!(socket.sent_of_type("CHAT_MESSAGE").is_empty());

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_receipt_without_reply_text_adds_nothing() {
    let api = MockApi::with_replies(vec![ApiReply::Receipt(SendReceipt {
        id: "srv_a".into(),
        text: String::new(),
        timestamp: None,
        reply_id: None,
    })]);
    let harness = TestHarness::builder().with_api(api).build();

    harness.client.send("quiet").await.unwrap();
    let messages = harness.client.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "srv_a");

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_receipt_reply_uses_generated_id_and_server_timestamp() {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let api = MockApi::with_replies(vec![ApiReply::Receipt(SendReceipt {
        id: "srv_b".into(),
        text: "answer".into(),
        timestamp: Some(at),
        reply_id: None,
    })]);
    let harness = TestHarness::builder().with_api(api).build();

    harness.client.send("question").await.unwrap();
    let reply = harness.client.messages().pop().unwrap();
    assert!(reply.id.starts_with("reply_"));
    assert_eq!(reply.timestamp, at);
    assert_eq!(reply.text, "answer");

    harness.client.shutdown().await;
}

// ---- Failure ----

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_marks_message_and_raises_error() {
    let api = MockApi::with_replies(vec![ApiReply::Fail("backend down".into())]);
    let harness = TestHarness::builder().with_api(api).build();

    let err = harness.client.send("hi").await.unwrap_err();
    assert!(!err.is_unauthorized());

    let messages = harness.client.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, MessageStatus::Failed);

    let error = harness.state().error().unwrap();
    assert_eq!(error.kind, ErrorKind::Delivery);
    assert!(error.message.starts_with("Failed to send message: "));
    assert!(error.message.contains("backend down"));
    // The credential survives a non-auth failure.
    assert_eq!(harness.live_token().as_deref(), Some("t1"));

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_delivery_requires_login() {
    let api = MockApi::with_replies(vec![ApiReply::Unauthorized]);
    let harness = TestHarness::builder().with_api(api).build();
    let mut rx = harness.events();

    let err = harness.client.send("hi").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(harness.live_token(), None);
    assert_eq!(harness.stored_token(), None);

    let mut saw_auth_required = false;
    while let Ok(event) = rx.try_recv() {
        saw_auth_required |= matches!(event, SessionEvent::AuthenticationRequired);
    }
    assert!(saw_auth_required);
    assert_eq!(harness.client.messages()[0].status, MessageStatus::Failed);

    harness.client.shutdown().await;
}

// ---- Retry ----

#[tokio::test(start_paused = true)]
async fn test_retry_redelivers_in_place() {
    let api = MockApi::with_replies(vec![ApiReply::Fail("flaky".into())]);
    let harness = TestHarness::builder().with_api(api).build();

    harness.client.send("again").await.unwrap_err();
    let failed = harness.client.messages().remove(0);
    let key = failed.idempotency_key.clone().unwrap();

    let retried = harness.client.retry(&key, "again").await.unwrap();
    assert_eq!(retried.status, MessageStatus::Acknowledged);
    assert_eq!(retried.idempotency_key.as_deref(), Some(key.as_str()));

    let sends = harness.api.sends().await;
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].1, sends[1].1);

    // Still a single user message, plus the reply.
    let users: Vec<Message> = harness
        .client
        .messages()
        .into_iter()
        .filter(|m| m.sender == Sender::User)
        .collect();
    assert_eq!(users.len(), 1);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_of_acknowledged_message_is_a_no_op() {
    let harness = TestHarness::new();

    let sent = harness.client.send("once").await.unwrap();
    let key = sent.idempotency_key.clone().unwrap();
    let before = harness.client.messages();

    let again = harness.client.retry(&key, "once").await.unwrap();
    assert_eq!(again, sent);
    assert_eq!(harness.api.send_calls(), 1);
    assert_eq!(harness.client.messages(), before);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_with_unknown_key_inserts_and_sends() {
    let harness = TestHarness::new();

    let sent = harness.client.retry("msg_restored_1", "from disk").await.unwrap();
    assert_eq!(sent.idempotency_key.as_deref(), Some("msg_restored_1"));
    assert_eq!(sent.text, "from disk");
    assert_eq!(
        harness.api.sends().await,
        [("from disk".to_string(), "msg_restored_1".to_string())]
    );

    harness.client.shutdown().await;
}

// ---- Typing ----

#[tokio::test(start_paused = true)]
async fn test_typing_is_best_effort() {
    let harness = TestHarness::new();
    assert!(!harness.client.send_typing(true).await);

    let socket = harness.open().await;
    assert!(harness.client.send_typing(true).await);
    assert!(harness.client.send_typing(false).await);
    assert_eq!(socket.sent_of_type("TYPING_START").len(), 1);
    assert_eq!(socket.sent_of_type("TYPING_STOP").len(), 1);
    assert_eq!(harness.api.send_calls(), 0);

    harness.client.shutdown().await;
}

// ---- History and session ----

#[tokio::test(start_paused = true)]
async fn test_fetch_history_replaces_conversation() {
    let harness = TestHarness::new();
    harness.client.send("local only").await.unwrap();

    let history = vec![
        Message::from_value(&json!({"id": "h1", "sender": "user", "text": "old"})).unwrap(),
        Message::from_value(&json!({"id": "h2", "text": "older reply"})).unwrap(),
        Message::from_value(&json!({"id": "h1", "text": "dup"})).unwrap(),
    ];
    harness.api.set_history(history).await;

    assert_eq!(harness.client.fetch_history().await.unwrap(), 2);
    let ids: Vec<String> = harness.client.messages().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, ["h1", "h2"]);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_history_unauthorized_drops_credential() {
    let harness = TestHarness::new();
    harness.api.fail_history(ApiReply::Unauthorized).await;

    assert!(harness.client.fetch_history().await.unwrap_err().is_unauthorized());
    assert_eq!(harness.live_token(), None);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_login_stores_token_and_connects() {
    let harness = TestHarness::builder().with_token(None).build();
    let password = SecretString::from("hunter2".to_string());

    harness.client.login("ada", &password).await.unwrap();
    assert_eq!(harness.api.logins().await, ["ada"]);
    assert_eq!(harness.stored_token().as_deref(), Some("mock-token"));

    let socket = harness.connector.wait_for_socket(0).await;
    let auth = socket.wait_for_sent("AUTH", 1).await;
    assert_eq!(auth[0]["token"], "mock-token");

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_logout_closes_and_forgets() {
    let harness = TestHarness::new();
    let socket = harness.open().await;
    harness.client.send("bye").await.unwrap();

    harness.client.logout().await.unwrap();
    assert_eq!(socket.client_close_code(), Some(Some(1000)));
    assert_eq!(harness.api.logout_calls(), 1);
    assert_eq!(harness.stored_token(), None);
    assert!(harness.client.messages().is_empty());

    harness.client.shutdown().await;
}
