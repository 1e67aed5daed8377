//! Stream client reconnection against the in-memory transport

mod common;

use cms_resilience::stream::{ConnectionState, MessageType, StreamEvent, StreamMessage};
use common::{fast_stream_config, settle, stream_client, MockTransport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_reconnect_resends_subscriptions_before_queued_messages() {
    let transport = Arc::new(MockTransport::default());
    let client = stream_client(fast_stream_config(), Arc::clone(&transport));
    client.connect().await.unwrap();

    let content = client.subscribe_to_content_changes("42");
    let presence = client.subscribe_to_presence("42");
    let mut first = transport.take_server(0);
    let announced = first.drain();
    assert_eq!(announced.len(), 2);
    assert!(announced.iter().all(|frame| frame["type"] == "subscribe"));

    first.close(1006, "abnormal closure");
    settle().await;
    assert_eq!(client.connection_state(), ConnectionState::Reconnecting);

    client
        .send(&StreamMessage::new(
            MessageType::PresenceUpdate,
            json!({"itemId": "42", "status": "editing"}),
        ))
        .unwrap();
    assert_eq!(client.queued_messages(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    assert!(client.is_connected());
    assert_eq!(transport.open_count(), 2);

    let mut second = transport.take_server(0);
    let frames = second.drain();
    let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
    assert_eq!(types, vec!["subscribe", "subscribe", "presence_update"]);
    assert_eq!(frames[0]["payload"]["id"], content.as_str());
    assert_eq!(frames[1]["payload"]["id"], presence.as_str());
    assert_eq!(client.queued_messages(), 0);

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_failed_reconnects_back_off_then_give_up() {
    let transport = Arc::new(MockTransport::default());
    let client = stream_client(fast_stream_config(), Arc::clone(&transport));
    let mut events = client.events();
    client.connect().await.unwrap();

    *transport.fail_opens.lock() = 10;
    transport.take_server(0).close(1011, "server restart");
    settle().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(transport.open_count(), 4);

    let mut scheduled = Vec::new();
    let mut gave_up = false;
    while let Ok(event) = events.try_recv() {
        match event.payload {
            StreamEvent::ReconnectScheduled { attempt, delay } => {
                scheduled.push((attempt, delay.as_millis() as u64));
            }
            StreamEvent::ReconnectFailed { attempts } => {
                assert_eq!(attempts, 3);
                gave_up = true;
            }
            _ => {}
        }
    }
    assert_eq!(scheduled, vec![(1, 100), (2, 200), (3, 400)]);
    assert!(gave_up);

    // An explicit connect starts over with a fresh attempt budget
    *transport.fail_opens.lock() = 0;
    client.connect().await.unwrap();
    assert!(client.is_connected());
    assert_eq!(client.reconnect_attempts(), 0);
    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_server_frames_become_typed_events() {
    let transport = Arc::new(MockTransport::default());
    let client = stream_client(fast_stream_config(), Arc::clone(&transport));
    let mut events = client.events();
    client.connect().await.unwrap();

    let id = client.subscribe_to_content_changes("42");
    let server = transport.take_server(0);
    server.push_frame(json!({"type": "subscription_confirmed", "payload": {"id": id}}));
    server.push_frame(json!({
        "type": "content_changed",
        "payload": {"itemId": "42", "changeType": "published", "version": 9}
    }));
    server.push_frame(json!({"type": "error", "payload": {"code": "FORBIDDEN", "message": "no"}}));
    server.push_raw("not json");
    settle().await;

    assert!(client.is_subscription_confirmed(&id));

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StreamEvent::ContentChanged(notification) = &event.payload {
            assert_eq!(notification.version, 9);
        }
        names.push(event.name);
    }
    assert!(names.contains(&"stream.subscription_confirmed"));
    assert!(names.contains(&"stream.content_changed"));
    assert!(names.contains(&"stream.server_error"));
    assert!(names.contains(&"stream.parse_error"));
    client.disconnect();
}
