//! Integration tests for inbound event routing and outbound frames.

#![allow(clippy::arithmetic_side_effects)]

use serde_json::{Value, json};
use talkbox_client::{ConnectionState, MessageDraft};
use talkbox_test::prelude::*;

/// A connected harness plus its server side.
async fn connected() -> (ClientHarness, MockServer) {
    let harness = ClientHarness::accepting();
    let mut states = harness.states();
    harness.client.connect().unwrap();
    let server = harness.connector.next_server().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Connected).await;
    (harness, server)
}

#[tokio::test(start_paused = true)]
async fn new_message_reaches_cache_and_callback() {
    let (harness, server) = connected().await;
    let message = test_message("m1", "c1");

    server.push_message(&message);
    harness.recorder.wait_for_messages(1).await;

    assert_eq!(harness.recorder.messages(), [message.clone()]);
    assert_eq!(harness.client.messages("c1"), [message]);
    assert!(harness.client.messages("c2").is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_delivery_is_cached_once() {
    let (harness, server) = connected().await;

    server.push_message(&test_message_at("m1", "c1", 1));
    server.push_message(&test_message_at("m1", "c1", 1));
    server.push_message(&test_message_at("m2", "c1", 2));
    harness.recorder.wait_for_messages(3).await;

    let ids: Vec<_> = harness
        .client
        .messages("c1")
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, ["m1", "m2"]);
}

#[tokio::test(start_paused = true)]
async fn mention_reaches_callback() {
    let (harness, server) = connected().await;

    server.push_json(&mentioned_event("c7", "m42"));
    harness
        .recorder
        .wait_until("mention", |r| !r.mentions().is_empty())
        .await;

    let mention = &harness.recorder.mentions()[0];
    assert_eq!(mention.conversation_id(), Some("c7"));
    assert_eq!(mention.message_id(), Some("m42"));
}

#[tokio::test(start_paused = true)]
async fn bad_frames_do_not_break_the_stream() {
    let (harness, server) = connected().await;

    server.push_frame("{not json");
    server.push_json(&json!({"event": "new_message", "data": {"id": "broken"}}));
    server.push_json(&json!({"event": "typing", "data": {"conversation_id": "c1"}}));
    server.push_json(&json!({"data": {}}));
    server.push_message(&test_message("m1", "c1"));
    harness.recorder.wait_for_messages(1).await;

    assert_eq!(harness.recorder.messages()[0].id, "m1");
    assert_eq!(harness.client.state(), ConnectionState::Connected);
    assert!(harness.recorder.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_message_types_are_kept() {
    let (harness, server) = connected().await;
    let mut frame = new_message_event(&test_message("m1", "c1"));
    frame["data"]["type"] = json!("sticker");
    frame["data"]["content"] = json!({"pack": "cats", "index": 3});

    server.push_json(&frame);
    harness.recorder.wait_for_messages(1).await;

    let message = &harness.client.messages("c1")[0];
    assert_eq!(message.body.kind(), "sticker");
    assert_eq!(message.body.content()["pack"], "cats");
}

#[tokio::test(start_paused = true)]
async fn send_message_writes_a_frame() {
    let (harness, mut server) = connected().await;

    harness
        .client
        .send_message("c1", &MessageDraft::text("hello").replying_to("m1"));

    let frame = within("frame", server.next_frame()).await.unwrap();
    let frame: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        frame,
        json!({
            "action": "send_message",
            "conversation_id": "c1",
            "type": "text",
            "content": {"text": "hello"},
            "reply_to_id": "m1",
        })
    );
}

#[tokio::test(start_paused = true)]
async fn flushed_disconnect_delivers_the_last_frame() {
    let (harness, mut server) = connected().await;
    let reader = tokio::spawn(async move {
        let mut frames = Vec::new();
        while let Some(frame) = server.next_frame().await {
            frames.push(frame);
        }
        frames
    });

    harness
        .client
        .send_message("c1", &MessageDraft::text("goodbye"));
    within("flushed disconnect", harness.client.disconnect_flushed()).await;

    let frames = reader.await.unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("goodbye"));
    assert_eq!(harness.client.state(), ConnectionState::Closed);
    assert_eq!(harness.recorder.connected_changes(), [true, false]);
}

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_is_dropped() {
    let harness = ClientHarness::accepting();
    let mut states = harness.states();

    harness.client.send_message("c1", &MessageDraft::text("lost"));

    harness.client.connect().unwrap();
    let mut server = harness.connector.next_server().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Connected).await;

    assert_eq!(server.try_next_frame(), None);
}

#[tokio::test(start_paused = true)]
async fn live_message_moves_conversation_to_front() {
    let (harness, server) = connected().await;
    harness.client.conversations().replace_all(vec![
        test_conversation("c1", 30),
        test_conversation("c2", 20),
        test_conversation("c3", 10),
    ]);

    server.push_message(&test_message("m1", "c3"));
    harness.recorder.wait_for_messages(1).await;
    assert_eq!(harness.client.conversations().ids(), ["c3", "c1", "c2"]);

    // Unknown conversations leave the order alone.
    server.push_message(&test_message("m2", "c9"));
    harness.recorder.wait_for_messages(2).await;
    assert_eq!(harness.client.conversations().ids(), ["c3", "c1", "c2"]);
}

#[tokio::test(start_paused = true)]
async fn last_registered_handler_wins() {
    let (harness, server) = connected().await;
    let replacement = CallbackRecorder::new();
    replacement.attach(&harness.client);

    server.push_message(&test_message("m1", "c1"));
    replacement.wait_for_messages(1).await;

    assert!(harness.recorder.messages().is_empty());
}
