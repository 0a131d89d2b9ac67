//! Integration tests for client construction, configuration, and teardown.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::time::Duration;

use talkbox_client::{
    Backoff, ChatClient, ClientError, ConnectionState, MemorySession, SessionStore,
    SupervisorSettings,
};
use talkbox_config::Config;
use talkbox_test::prelude::*;

#[tokio::test(start_paused = true)]
async fn stream_url_carries_the_session_token() {
    let harness = ClientHarness::accepting();
    let mut states = harness.states();

    harness.client.connect().unwrap();
    let _server = harness.connector.next_server().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Connected).await;

    assert_eq!(
        harness.connector.urls(),
        ["ws://talkbox.test/ws?token=test-token"]
    );
    assert!(harness.client.is_connected());
}

#[tokio::test]
async fn connect_without_token_fails() {
    let harness = ClientHarness::accepting();
    harness.session.logout();

    let err = harness.client.connect().unwrap_err();

    assert!(matches!(err, ClientError::MissingToken));
    assert_eq!(harness.client.state(), ConnectionState::Disconnected);
    assert_eq!(harness.connector.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_client_closes_the_stream() {
    let harness = ClientHarness::accepting();
    let mut states = harness.states();
    harness.client.connect().unwrap();
    let mut server = harness.connector.next_server().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Connected).await;

    let ClientHarness {
        client, connector, ..
    } = harness;
    drop(client);

    assert_eq!(within("stream closed", server.next_frame()).await, None);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_count(), 1);
}

#[test]
fn settings_follow_the_config_file() {
    let dir = test_dir();
    let path = test_file_in_dir(
        &dir,
        "config.toml",
        r#"
[server]
url = "http://localhost:8080"
stream_path = "/events"

[reconnect]
max_attempts = 8
strategy = "exponential"
delay_ms = 500
max_delay_ms = 20000

[heartbeat]
interval_ms = 15000
require_pong = true
"#,
    );

    let config = Config::load_file(&path).unwrap();
    let settings = SupervisorSettings::from(&config);

    assert_eq!(settings.server_url, "http://localhost:8080");
    assert_eq!(settings.stream_path, "/events");
    assert_eq!(settings.max_attempts, 8);
    assert_eq!(
        settings.backoff,
        Backoff::Exponential {
            base_ms: 500,
            max_ms: 20_000
        }
    );
    assert_eq!(settings.heartbeat_interval, Duration::from_secs(15));
    assert!(settings.require_pong);
    assert_eq!(config.history.page_size, 50);
}

#[test]
fn client_builds_from_default_config() {
    let config = Config::default();
    let session: Arc<dyn SessionStore> = Arc::new(MemorySession::new("t"));

    let client = ChatClient::from_config(&config, session).unwrap();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.messages("c1").is_empty());
    assert!(client.conversations().ids().is_empty());
}

#[test]
fn client_rejects_unusable_server_url() {
    let mut config = Config::default();
    config.server.url = "mailto:nobody@example.com".to_owned();

    let result = ChatClient::from_config(&config, Arc::new(MemorySession::default()));

    assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
}

#[test]
fn client_loads_its_config_file() {
    let dir = test_dir();
    let good = test_file_in_dir(&dir, "good.toml", "[server]\nurl = \"http://localhost:9000\"\n");
    let bad = test_file_in_dir(&dir, "bad.toml", "[server\nurl = ");

    let client = ChatClient::from_config_file(&good, Arc::new(MemorySession::new("t"))).unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let result = ChatClient::from_config_file(&bad, Arc::new(MemorySession::new("t")));
    assert!(matches!(result, Err(ClientError::Config(_))));
}
