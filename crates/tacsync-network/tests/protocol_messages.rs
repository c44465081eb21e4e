use serde_json::json;
use tacsync_network::{
    ActionEnvelope, Envelope, ErrorCode, InboundMessage, OutboundMessage, PlayerActionRequest,
    ProtocolError, StateDiffPayload,
};
use test_case::test_case;

#[test_case("ROOM_FULL", ErrorCode::RoomFull ; "room full")]
#[test_case("ROOM_NOT_FOUND", ErrorCode::RoomNotFound ; "room not found")]
#[test_case("INVALID_ACTION", ErrorCode::InvalidAction ; "invalid action")]
#[test_case("NOT_YOUR_TURN", ErrorCode::NotYourTurn ; "not your turn")]
#[test_case("DISCONNECTED", ErrorCode::Disconnected ; "disconnected")]
#[test_case("TEAPOT", ErrorCode::Unknown ; "unrecognised")]
fn test_error_codes(wire: &str, expected: ErrorCode) {
    let envelope = Envelope::new("error", json!({ "code": wire, "message": "x" }));
    match InboundMessage::from_envelope(&envelope).unwrap() {
        InboundMessage::Error(payload) => assert_eq!(payload.code, expected),
        other => panic!("expected error, got {other:?}"),
    }
}

#[test_case("connect", json!({"id": "p1"}))]
#[test_case("roomCreated", json!({"room": {"id": "r", "name": "Ops", "maxPlayers": 2}}))]
#[test_case("roomJoined", json!({"room": {"id": "r", "name": "Ops", "maxPlayers": 2, "players": [{"id": "p1", "name": "A", "ready": true}]}}))]
#[test_case("roomStateUpdate", json!({"room": {"id": "r", "name": "Ops", "maxPlayers": 2, "status": "playing"}}))]
#[test_case("roomList", json!({"rooms": []}))]
#[test_case("gameStarted", json!({"roomId": "r", "state": {}}))]
#[test_case("stateSync", json!({"roomId": "r", "state": {}, "timestamp": 1}))]
#[test_case("stateDiff", json!({"roomId": "r", "diff": [], "timestamp": 1}))]
#[test_case("requestSync", json!({"roomId": "r", "playerId": "p2"}))]
#[test_case("playerAction", json!({"playerId": "p2", "action": {"type": "turnChanged", "data": {"player": "p1"}}}))]
fn test_known_types_classify(kind: &str, data: serde_json::Value) {
    let message = InboundMessage::from_envelope(&Envelope::new(kind, data)).unwrap();
    assert_eq!(message.kind(), kind);
}

#[test]
fn test_unknown_type_is_reported() {
    let result = InboundMessage::from_envelope(&Envelope::new("spectate", json!({})));
    assert!(matches!(result, Err(ProtocolError::UnknownType(kind)) if kind == "spectate"));
}

#[test]
fn test_player_action_wire_shape() {
    let message = OutboundMessage::PlayerAction(PlayerActionRequest {
        action: ActionEnvelope {
            kind: "characterPosition".to_string(),
            data: json!({"name": "alpha", "position": {"x": 1, "y": 2}, "senderId": "p1"}),
        },
    });

    let envelope = message.to_envelope().unwrap();
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "type": "playerAction",
            "data": {"action": {"type": "characterPosition", "data": {
                "name": "alpha", "position": {"x": 1, "y": 2}, "senderId": "p1"
            }}}
        })
    );
}

#[test]
fn test_state_diff_payload_is_camel_case() {
    let message = OutboundMessage::StateDiff(StateDiffPayload {
        room_id: "r1".to_string(),
        diff: json!([]),
        timestamp: 7,
    });
    let envelope = message.to_envelope().unwrap();
    assert_eq!(envelope.data, json!({"roomId": "r1", "diff": [], "timestamp": 7}));
}
