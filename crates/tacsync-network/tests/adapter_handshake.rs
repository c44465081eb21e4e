mod common;

use common::{next_event, MockConnector, Script};
use tacsync_network::{
    kinds, InboundMessage, NetworkError, TransportAdapter, TransportConfig, TransportEvent,
};

#[tokio::test(start_paused = true)]
async fn test_connect_returns_assigned_id() {
    let connector = MockConnector::new(vec![Script::accept("p3")]);
    let conn = TransportAdapter::connect(
        connector.clone(),
        "Carol",
        "mem://relay",
        TransportConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(conn.network_id, "p3");
    assert_eq!(conn.handle.network_id(), "p3");

    let hello = &connector.sent(0)[0];
    assert_eq!(hello.kind, kinds::CONNECT);
    assert_eq!(hello.data["name"], "Carol");
}

#[tokio::test(start_paused = true)]
async fn test_missing_ack_times_out() {
    let connector = MockConnector::new(vec![Script::silent()]);
    let result = TransportAdapter::connect(
        connector,
        "Carol",
        "mem://relay",
        TransportConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(NetworkError::Timeout)));
}

#[tokio::test]
async fn test_refused_open_fails_fast() {
    let connector = MockConnector::new(Vec::new());
    let result = TransportAdapter::connect(
        connector,
        "Carol",
        "mem://relay",
        TransportConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn test_frames_before_ack_are_delivered() {
    let connector = MockConnector::new(vec![
        Script::accept("p1").preceded_by(r#"{"type":"roomList","data":{"rooms":[]}}"#),
    ]);
    let mut conn = TransportAdapter::connect(
        connector,
        "Carol",
        "mem://relay",
        TransportConfig::default(),
    )
    .await
    .unwrap();

    match next_event(&mut conn.events).await {
        TransportEvent::Envelope(envelope) => {
            assert!(matches!(
                InboundMessage::from_envelope(&envelope).unwrap(),
                InboundMessage::RoomList(_)
            ));
        }
        other => panic!("expected envelope, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_frames_are_dropped() {
    let connector = MockConnector::new(vec![Script::accept("p1")
        .then("definitely not json")
        .then(r#"{"type":"roomLeft"}"#)]);
    let mut conn = TransportAdapter::connect(
        connector,
        "Carol",
        "mem://relay",
        TransportConfig::default(),
    )
    .await
    .unwrap();

    match next_event(&mut conn.events).await {
        TransportEvent::Envelope(envelope) => assert_eq!(envelope.kind, kinds::ROOM_LEFT),
        other => panic!("expected envelope, got {other:?}"),
    }

    let stats = conn.handle.stats().await;
    assert_eq!(stats.dropped_frames, 1);
    assert_eq!(stats.messages_received, 1);
}
