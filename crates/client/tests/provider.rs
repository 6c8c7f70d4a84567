//! Provider scope and hooks.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use synapse_client::ws::{
    try_use_updates, use_connection_state, use_is_connected, use_subscribe, use_updates,
    ProviderError,
};
use synapse_client::{ConnectionState, ReconnectConfig, ServerEvent, UpdatesClient, UpdatesProvider};

use common::{ScriptedConnector, Step};

fn scripted_client(connector: Arc<ScriptedConnector>) -> UpdatesClient {
    UpdatesClient::with_connector(
        "ws://backend.test/ws/updates",
        ReconnectConfig::default(),
        connector,
    )
}

#[test]
fn test_try_use_updates_outside_provider() {
    assert_eq!(try_use_updates().unwrap_err(), ProviderError::Missing);
}

#[test]
#[should_panic(expected = "no UpdatesProvider in scope")]
fn test_use_is_connected_outside_provider_panics() {
    use_is_connected();
}

#[tokio::test]
#[should_panic(expected = "no UpdatesProvider in scope")]
async fn test_use_subscribe_outside_provider_panics() {
    let _sub = use_subscribe(Arc::new(|_: &ServerEvent| {}));
}

#[tokio::test(start_paused = true)]
async fn test_run_exposes_client_and_tears_down() {
    let connector = ScriptedConnector::new([Step::open_and_hold(vec![
        ServerEvent::ProfileChange(json!({"profile": "main", "active": true})).to_frame(),
    ])]);
    let client = scripted_client(connector.clone());
    let provider = UpdatesProvider::new(client.clone());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let seen = provider
        .run(async move {
            let sub = use_subscribe(Arc::new(move |event: &ServerEvent| {
                let _ = tx.send(event.clone());
            }));
            assert!(use_updates().is_running());

            let event = rx.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert!(use_is_connected());
            assert_eq!(use_connection_state(), ConnectionState::Connected);

            sub.unsubscribe();
            event
        })
        .await;

    assert_eq!(seen.kind(), synapse_client::EventKind::ProfileChange);
    assert!(!client.is_running());
    assert!(!client.is_connected());
    assert_eq!(client.subscriber_count(), 0);
    assert_eq!(connector.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scope_leaves_lifecycle_alone() {
    let connector = ScriptedConnector::failing();
    let client = scripted_client(connector.clone());
    let provider = UpdatesProvider::new(client.clone());

    let url = provider
        .scope(async { use_updates().url().to_string() })
        .await;

    assert_eq!(url, "ws://backend.test/ws/updates");
    assert!(!client.is_running());
    assert_eq!(connector.attempt_count(), 0);
    assert_eq!(try_use_updates().unwrap_err(), ProviderError::Missing);
}
