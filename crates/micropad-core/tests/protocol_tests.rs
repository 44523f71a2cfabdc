//! Protocol handler behaviour: correlation, timeouts, chunked traffic and
//! event dispatch over a scripted device

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use micropad_core::protocol::{split_into_frames, Command, EventKind};
use micropad_core::{
    ActionType, Envelope, KeyConfig, Profile, ProtocolHandler, RequestError, StatsPoller,
};
use serde_json::{json, Value};
use test_utils::{connected, manager, settle, test_config, MockTransport};
use tokio::time::{sleep, timeout, Instant};

fn device_info_responder(request: &Envelope) -> Option<Value> {
    match request.command.as_ref()? {
        Command::GetDeviceInfo => Some(json!({"deviceId": "abc", "batteryLevel": 87})),
        _ => None,
    }
}

async fn wait_for_pending(handler: &ProtocolHandler, count: usize) {
    while handler.pending_count() < count {
        tokio::task::yield_now().await;
    }
}

// ----------------------------------------------------------------------------
// Request / Response
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_get_device_info_round_trip() {
    let (transport, handler) = connected(test_config()).await;
    transport.respond_with(device_info_responder);

    let info = handler.get_device_info().await.unwrap().unwrap();
    assert_eq!(info.device_id, "abc");
    assert_eq!(info.battery_level, 87);

    let sent: Value = serde_json::from_str(&transport.written()[0]).unwrap();
    assert_eq!(
        sent,
        json!({"v": 1, "type": "request", "id": 1, "cmd": "getDeviceInfo"})
    );
    assert_eq!(handler.pending_count(), 0);
}

#[tokio::test]
async fn test_request_ids_strictly_increase() {
    let (transport, handler) = connected(test_config()).await;
    transport.respond_with(|_| Some(json!({"success": true})));

    for _ in 0..5 {
        handler.send_request(Command::GetStats, None).await.unwrap();
    }
    let concurrent = (0..5).map(|_| handler.send_request(Command::GetStats, None));
    for response in futures::future::join_all(concurrent).await {
        response.unwrap();
    }

    let ids: Vec<u32> = transport.requests().iter().map(|request| request.id).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_responses_complete_out_of_order() {
    let (transport, handler) = connected(test_config()).await;

    let first = tokio::spawn({
        let handler = handler.clone();
        async move { handler.send_request(Command::GetStats, None).await }
    });
    wait_for_pending(&handler, 1).await;
    let second = tokio::spawn({
        let handler = handler.clone();
        async move { handler.send_request(Command::GetStats, None).await }
    });
    wait_for_pending(&handler, 2).await;

    transport.inject(r#"{"v":1,"type":"response","id":2,"payload":{"uptime":2}}"#);
    transport.inject(r#"{"v":1,"type":"response","id":1,"payload":{"uptime":1}}"#);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.payload_field("uptime"), Some(&json!(1)));
    assert_eq!(second.payload_field("uptime"), Some(&json!(2)));
}

#[tokio::test]
async fn test_unknown_response_id_is_dropped() {
    let (transport, handler) = connected(test_config()).await;
    let mut events = handler.subscribe_events();

    transport.inject(r#"{"v":1,"type":"response","id":999,"payload":{}}"#);
    transport.inject("not json at all");
    transport.inject(r#"{"v":1,"type":"response""#);
    settle().await;

    assert!(events.try_recv().is_err());
    assert_eq!(handler.pending_count(), 0);

    transport.respond_with(device_info_responder);
    assert!(handler.get_device_info().await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_removes_pending() {
    let (transport, handler) = connected(test_config()).await;

    let started = Instant::now();
    let err = handler
        .send_request(Command::GetDeviceInfo, None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RequestError::Timeout {
            id: 1,
            timeout_ms: 5000
        }
    );
    assert!(err.is_retryable());
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(handler.pending_count(), 0);

    // The late response is a no-op
    transport.inject(r#"{"v":1,"type":"response","id":1,"payload":{"batteryLevel":1}}"#);
    settle().await;
    assert_eq!(handler.pending_count(), 0);

    transport.respond_with(device_info_responder);
    let info = handler.get_device_info().await.unwrap().unwrap();
    assert_eq!(info.battery_level, 87);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_request_releases_pending() {
    let (transport, handler) = connected(test_config()).await;

    let result = timeout(
        Duration::from_secs(1),
        handler.send_request(Command::GetStats, None),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(handler.pending_count(), 0);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(handler.pending_count(), 0);

    // A response for the abandoned id finds nothing to complete
    transport.inject(r#"{"v":1,"type":"response","id":1,"payload":{"uptime":5}}"#);
    settle().await;
    assert_eq!(handler.pending_count(), 0);
}

#[tokio::test]
async fn test_request_while_disconnected_fails_fast() {
    let transport = MockTransport::new();
    let handler = ProtocolHandler::new(manager(&transport, test_config()));

    let result = timeout(
        Duration::from_millis(100),
        handler.send_request(Command::GetDeviceInfo, None),
    )
    .await
    .expect("request waited for its deadline");

    assert_eq!(result.unwrap_err(), RequestError::NotConnected);
    assert_eq!(handler.pending_count(), 0);
}

#[tokio::test]
async fn test_write_failure_surfaces_as_transport_error() {
    let (transport, handler) = connected(test_config()).await;
    transport.fail_writes_after(0);

    let err = handler.get_stats().await.unwrap_err();
    assert!(matches!(err, RequestError::Transport(_)));
    assert_eq!(handler.pending_count(), 0);
}

// ----------------------------------------------------------------------------
// Typed Operations
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_profile_operations() {
    let (transport, handler) = connected(test_config()).await;
    transport.respond_with(|request| match request.command.as_ref()? {
        Command::ListProfiles => Some(json!({"profiles": [
            {"id": 0, "name": "Default", "size": 512},
            {"id": 1, "name": "Editing", "size": 640}
        ]})),
        Command::GetProfile if request.profile_id == Some(1) => Some(json!({
            "id": 1,
            "name": "Editing",
            "keys": [{"index": 0, "type": 4, "function": 3}]
        })),
        Command::GetProfile => Some(json!({"success": false, "error": "Profile not found"})),
        Command::SetActiveProfile => Some(json!({"profileId": request.profile_id})),
        _ => None,
    });

    let profiles = handler.list_profiles().await.unwrap().unwrap();
    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles[1].name, "Editing");

    let profile = handler.get_profile(1).await.unwrap().unwrap();
    assert_eq!(profile.key(0).unwrap().action_type, ActionType::Media);
    assert!(handler.get_profile(7).await.unwrap().is_none());

    assert!(handler.set_active_profile(1).await.unwrap().success);
    let request = transport.requests().pop().unwrap();
    assert_eq!(request.command, Some(Command::SetActiveProfile));
    assert_eq!(request.profile_id, Some(1));
}

#[tokio::test]
async fn test_large_profile_push_is_chunked() {
    let (transport, handler) = connected(test_config()).await;
    transport.respond_with(|request| match request.command.as_ref()? {
        Command::SetProfile => Some(json!({"success": true})),
        _ => None,
    });

    let profile = Profile {
        id: 3,
        name: "Streaming".into(),
        keys: (0..12)
            .map(|index| KeyConfig {
                index,
                action_type: ActionType::Text,
                text: Some(format!("macro text number {} with some padding", index)),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    let ack = handler.set_profile(&profile).await.unwrap();
    assert!(ack.success);
    assert!(transport.written().len() > 1);

    let received = transport.requests().pop().unwrap();
    let document: Profile = serde_json::from_value(received.profile.unwrap()).unwrap();
    assert_eq!(document, profile);
}

#[tokio::test]
async fn test_failed_ack_reports_error() {
    let (transport, handler) = connected(test_config()).await;
    transport.respond_with(|_| Some(json!({"success": false, "error": "Not implemented yet"})));

    let ack = handler.set_profile(&Profile::default()).await.unwrap();
    assert!(!ack.success);
    assert_eq!(ack.error.as_deref(), Some("Not implemented yet"));

    assert!(handler.reboot().await.map(|ack| !ack.success).unwrap());
}

// ----------------------------------------------------------------------------
// Chunked Inbound Traffic
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_large_response_is_reassembled() {
    let (transport, handler) = connected(test_config()).await;
    let capabilities: Vec<String> = (0..60).map(|i| format!("capability-{}", i)).collect();
    let expected = capabilities.clone();
    transport.respond_with(move |_| {
        Some(json!({"deviceId": "abc", "capabilities": capabilities.clone()}))
    });

    let info = handler.get_device_info().await.unwrap().unwrap();
    assert_eq!(info.capabilities, expected);
}

#[tokio::test]
async fn test_chunked_event_restart_discards_partial() {
    let (transport, handler) = connected(test_config()).await;
    let mut events = handler.subscribe_events();

    let stale = Envelope::event(EventKind::Unknown("stale".into()), json!({"pad": "s".repeat(1500)}));
    let fresh = Envelope::event(EventKind::ProfileChanged, json!({"profileId": 4, "pad": "f".repeat(700)}));
    let stale_frames = split_into_frames(stale.to_json().unwrap().as_bytes(), 348).unwrap();
    let fresh_frames = split_into_frames(fresh.to_json().unwrap().as_bytes(), 348).unwrap();
    assert!(stale_frames.len() > fresh_frames.len());

    transport.inject(&stale_frames[0]);
    transport.inject(&stale_frames[1]);
    for frame in &fresh_frames {
        transport.inject(frame);
    }

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, fresh);
    assert_eq!(event.profile_changed(), Some(4));

    settle().await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_legacy_chunk_encoding_is_accepted() {
    let (transport, handler) = connected(test_config()).await;
    let mut events = handler.subscribe_events();

    let text = r#"{"v":1,"type":"event","event":"profileChanged","payload":{"profileId":2}}"#;
    let pieces: Vec<&[u8]> = text.as_bytes().chunks(30).collect();
    for (index, piece) in pieces.iter().enumerate() {
        let escaped = std::str::from_utf8(piece)
            .unwrap()
            .replace('\\', "\\\\")
            .replace('"', "\\\"");
        transport.inject(&format!(
            r#"{{"chunk":{},"total":{},"data":"{}"}}"#,
            index,
            pieces.len(),
            escaped
        ));
    }

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, Some(EventKind::ProfileChanged));
    assert_eq!(event.profile_changed(), Some(2));
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_events_are_not_correlated() {
    let (transport, handler) = connected(test_config()).await;
    let mut events = handler.subscribe_events();

    let pending = tokio::spawn({
        let handler = handler.clone();
        async move { handler.send_request(Command::GetStats, None).await }
    });
    wait_for_pending(&handler, 1).await;

    // Same id as the pending request, but an event
    transport.inject(r#"{"v":1,"type":"event","id":1,"event":"profileChanged","payload":{"profileId":3}}"#);
    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.profile_changed(), Some(3));
    assert_eq!(handler.pending_count(), 1);

    transport.inject(r#"{"v":1,"type":"response","id":1,"payload":{"uptime":5}}"#);
    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.payload_field("uptime"), Some(&json!(5)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fresh_handler_hears_first_event() {
    for _ in 0..50 {
        let transport = MockTransport::new();
        let connection = manager(&transport, test_config());
        connection.connect(test_utils::DEVICE_ID).await.unwrap();

        let handler = ProtocolHandler::new(connection);
        let mut events = handler.subscribe_events();
        transport.inject(r#"{"v":1,"type":"event","event":"profileChanged","payload":{"profileId":2}}"#);

        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("handler stopped listening")
            .unwrap();
        assert_eq!(event.profile_changed(), Some(2));
    }
}

// ----------------------------------------------------------------------------
// Stats Poller
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_stats_poller_publishes_snapshots() {
    let (transport, handler) = connected(test_config()).await;
    transport.respond_with(|request| match request.command.as_ref()? {
        Command::GetStats => Some(json!({"keyPresses": [1, 0, 2], "encoderTurns": [0, 0], "uptime": 42})),
        _ => None,
    });

    let poller = StatsPoller::spawn(Arc::clone(&handler), Duration::from_secs(1));
    let mut snapshots = poller.subscribe();
    timeout(Duration::from_secs(5), snapshots.changed())
        .await
        .unwrap()
        .unwrap();

    let stats = poller.latest().unwrap();
    assert_eq!(stats.uptime, 42);
    assert_eq!(stats.total_key_presses(), 3);

    let polled = transport.requests().len();
    poller.stop();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.requests().len(), polled);
}
