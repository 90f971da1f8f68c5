//! Publisher session tests against in-memory sockets
//!
//! Run with: cargo test -p waypoint --test publisher_session

mod common;

use common::*;
use serde_json::json;
use std::time::Duration;
use waypoint::{EventName, PositionInput, PublisherSession, EXTERNAL_ORIGIN};

fn publisher_config() -> waypoint::SessionConfig {
    test_config().with_map_uuid("map-1")
}

#[tokio::test]
async fn test_send_position_connects_lazily() {
    let (factory, mut sockets) = ScriptedFactory::new();
    let publisher = PublisherSession::with_factory(publisher_config(), factory.clone()).unwrap();
    assert!(factory.attempts().is_empty());

    let result = publisher
        .send_position(PositionInput::new("AA:BB:CC:DD:EE:FF", 48.85, 2.35).with_user_name("Van 3"))
        .await;
    assert!(result.success, "{result:?}");
    assert_eq!(result.error, None);

    let mut server = sockets.next().await;
    assert!(server.url.starts_with(PUBLISHER_URL));

    let envelope = server.recv_json().await;
    verbose_println!("envelope: {}", envelope);
    assert_eq!(envelope["user_uuid"], "aabbccddeeff");
    assert_eq!(envelope["user_name"], "Van 3");
    assert_eq!(envelope["app_namespace"], "fleet");
    assert_eq!(envelope["map_uuid"], "map-1");
    assert_eq!(envelope["origin"], json!(EXTERNAL_ORIGIN));
    assert_eq!(envelope["lat"], json!(48.85));
    assert!(envelope["timestamp"].as_str().unwrap().ends_with('Z'));

    // Second publish reuses the socket
    assert!(publisher.send_position(PositionInput::new("aabbccddeeff", 1.0, 1.0)).await.success);
    let _ = server.recv_json().await;
    assert_eq!(factory.attempts().len(), 1);
    eventually(|| publisher.metrics().messages_sent == 2).await;

    publisher.disconnect().await;
}

#[tokio::test]
async fn test_malformed_device_id_never_touches_socket() {
    let (factory, _sockets) = ScriptedFactory::new();
    let publisher = PublisherSession::with_factory(publisher_config(), factory.clone()).unwrap();

    let result = publisher.send_position(PositionInput::new("not-a-mac", 0.0, 0.0)).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("Invalid device identifier"));
    assert!(factory.attempts().is_empty());
    assert!(!publisher.is_connected());
}

#[tokio::test]
async fn test_connection_failure_is_reported_as_result() {
    let (factory, _sockets) = ScriptedFactory::new();
    factory.script(Plan::Fail);
    let publisher = PublisherSession::with_factory(publisher_config(), factory.clone()).unwrap();
    let errors = record_events(publisher.events(), &[EventName::Error]);

    let result = publisher.send_position(PositionInput::new("aabbccddeeff", 0.0, 0.0)).await;
    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(errors.lock().len(), 1);
}

#[tokio::test]
async fn test_batch_with_one_malformed_item() {
    let (factory, mut sockets) = ScriptedFactory::new();
    let publisher = PublisherSession::with_factory(publisher_config(), factory).unwrap();

    let result = publisher
        .send_batch(vec![
            PositionInput::new("aa:bb:cc:dd:ee:01", 1.0, 1.0),
            PositionInput::new("bogus", 2.0, 2.0),
            PositionInput::new("aa-bb-cc-dd-ee-02", 3.0, 3.0),
        ])
        .await;
    verbose_println!("batch: {:?}", result);

    assert!(!result.success);
    assert_eq!(result.sent, 2);
    assert_eq!(result.failed, 1);
    let errors = result.errors.expect("errors present");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].device_id, "bogus");

    let mut server = sockets.next().await;
    assert_eq!(server.recv_json().await["user_uuid"], "aabbccddee01");
    assert_eq!(server.recv_json().await["user_uuid"], "aabbccddee02");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(server.try_recv().is_none());

    publisher.disconnect().await;
}

#[tokio::test]
async fn test_batch_connection_failure_fails_every_item() {
    let (factory, _sockets) = ScriptedFactory::new();
    factory.script(Plan::Reject(503));
    let publisher = PublisherSession::with_factory(publisher_config(), factory).unwrap();

    let result = publisher
        .send_batch(vec![
            PositionInput::new("aabbccddee01", 1.0, 1.0),
            PositionInput::new("aabbccddee02", 2.0, 2.0),
        ])
        .await;

    assert!(!result.success);
    assert_eq!((result.sent, result.failed), (0, 2));
    let errors = result.errors.unwrap();
    assert_eq!(errors[0].device_id, "aabbccddee01");
    assert_eq!(errors[1].device_id, "aabbccddee02");
}

#[tokio::test]
async fn test_empty_batch_is_a_success_without_connecting() {
    let (factory, _sockets) = ScriptedFactory::new();
    let publisher = PublisherSession::with_factory(publisher_config(), factory.clone()).unwrap();

    let result = publisher.send_batch(Vec::new()).await;
    assert!(result.success);
    assert_eq!((result.sent, result.failed), (0, 0));
    assert!(factory.attempts().is_empty());
}

#[tokio::test]
async fn test_missing_map_uuid_fails_item() {
    let (factory, _sockets) = ScriptedFactory::new();
    let publisher = PublisherSession::with_factory(test_config(), factory.clone()).unwrap();

    let result = publisher.send_position(PositionInput::new("aabbccddeeff", 0.0, 0.0)).await;
    assert!(!result.success);
    assert!(factory.attempts().is_empty());

    // A per-position map is enough
    let result = publisher
        .send_position(PositionInput::new("aabbccddeeff", 0.0, 0.0).with_map_uuid("map-9"))
        .await;
    assert!(result.success, "{result:?}");

    publisher.disconnect().await;
}

#[tokio::test]
async fn test_publisher_forwards_server_messages() {
    let (factory, mut sockets) = ScriptedFactory::new();
    let publisher = PublisherSession::with_factory(publisher_config(), factory).unwrap();
    let log = record_events(publisher.events(), &[EventName::Message]);

    publisher.connect().await.unwrap();
    let server = sockets.next().await;
    server.push_json(json!({"status": "ok"}));

    eventually(|| log.lock().len() == 1).await;
    publisher.disconnect().await;
}
