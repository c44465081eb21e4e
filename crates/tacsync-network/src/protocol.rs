//! Protocol message definitions for the Tacsync relay
//!
//! Every frame is a JSON envelope `{ "type": ..., "data": ... }`. Payloads
//! carrying game state stay opaque `serde_json::Value`s at this layer.

use crate::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Envelope `type` vocabulary
pub mod kinds {
    pub const CONNECT: &str = "connect";
    pub const CREATE_ROOM: &str = "createRoom";
    pub const JOIN_ROOM: &str = "joinRoom";
    pub const LEAVE_ROOM: &str = "leaveRoom";
    pub const PLAYER_READY: &str = "playerReady";
    pub const REQUEST_ROOM_LIST: &str = "requestRoomList";
    pub const ROOM_CREATED: &str = "roomCreated";
    pub const ROOM_JOINED: &str = "roomJoined";
    pub const ROOM_LEFT: &str = "roomLeft";
    pub const ROOM_STATE_UPDATE: &str = "roomStateUpdate";
    pub const ROOM_LIST: &str = "roomList";
    pub const GAME_STARTED: &str = "gameStarted";
    pub const STATE_SYNC: &str = "stateSync";
    pub const STATE_DIFF: &str = "stateDiff";
    pub const REQUEST_SYNC: &str = "requestSync";
    pub const PLAYER_ACTION: &str = "playerAction";
    pub const ERROR: &str = "error";
}

/// Wire frame
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Build an envelope from a typed payload
    pub fn encode<T: Serialize>(kind: &str, payload: &T) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(payload).map_err(|e| ProtocolError::InvalidPayload {
            kind: kind.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(kind, data))
    }

    /// Decode the payload; a missing `data` field reads as an empty object
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let data = match &self.data {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectAck {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    pub max_players: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerReadyRequest {
    pub ready: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "camelCase")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Starting,
    Playing,
    Finished,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ready: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub max_players: u8,
    #[serde(default)]
    pub players: Vec<RoomMember>,
    #[serde(default)]
    pub status: RoomStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoomPayload {
    pub room: RoomInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RoomListPayload {
    #[serde(default)]
    pub rooms: Vec<RoomInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedPayload {
    #[serde(default)]
    pub room_id: Option<String>,
    /// Initial snapshot; `null` when the host generates the board
    #[serde(default)]
    pub state: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSyncPayload {
    pub room_id: String,
    pub state: Value,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateDiffPayload {
    pub room_id: String,
    pub diff: Value,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestPayload {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

/// A mutation event as carried inside `playerAction`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerActionRequest {
    pub action: ActionEnvelope,
}

/// `playerAction` as relayed to the other room members
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerActionPayload {
    #[serde(default)]
    pub player_id: Option<String>,
    pub action: ActionEnvelope,
}

impl PlayerActionPayload {
    /// Originating player: the relay stamp, else the sender's own stamp
    pub fn origin(&self) -> Option<&str> {
        self.player_id
            .as_deref()
            .or_else(|| self.action.data.get("senderId").and_then(Value::as_str))
    }
}

/// Machine-readable error codes reported by the relay
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RoomFull,
    RoomNotFound,
    InvalidAction,
    NotYourTurn,
    Disconnected,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RoomFull => "ROOM_FULL",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::InvalidAction => "INVALID_ACTION",
            ErrorCode::NotYourTurn => "NOT_YOUR_TURN",
            ErrorCode::Disconnected => "DISCONNECTED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

/// Messages received from the relay
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Connect(ConnectAck),
    RoomCreated(RoomPayload),
    RoomJoined(RoomPayload),
    RoomLeft,
    RoomStateUpdate(RoomPayload),
    RoomList(RoomListPayload),
    GameStarted(GameStartedPayload),
    StateSync(StateSyncPayload),
    StateDiff(StateDiffPayload),
    SyncRequested(SyncRequestPayload),
    PlayerAction(PlayerActionPayload),
    Error(ErrorPayload),
}

impl InboundMessage {
    /// Classify an envelope by its `type`
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let message = match envelope.kind.as_str() {
            kinds::CONNECT => InboundMessage::Connect(envelope.decode()?),
            kinds::ROOM_CREATED => InboundMessage::RoomCreated(envelope.decode()?),
            kinds::ROOM_JOINED => InboundMessage::RoomJoined(envelope.decode()?),
            kinds::ROOM_LEFT => InboundMessage::RoomLeft,
            kinds::ROOM_STATE_UPDATE => InboundMessage::RoomStateUpdate(envelope.decode()?),
            kinds::ROOM_LIST => InboundMessage::RoomList(envelope.decode()?),
            kinds::GAME_STARTED => InboundMessage::GameStarted(envelope.decode()?),
            kinds::STATE_SYNC => InboundMessage::StateSync(envelope.decode()?),
            kinds::STATE_DIFF => InboundMessage::StateDiff(envelope.decode()?),
            kinds::REQUEST_SYNC => InboundMessage::SyncRequested(envelope.decode()?),
            kinds::PLAYER_ACTION => InboundMessage::PlayerAction(envelope.decode()?),
            kinds::ERROR => InboundMessage::Error(envelope.decode()?),
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(message)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Connect(_) => kinds::CONNECT,
            InboundMessage::RoomCreated(_) => kinds::ROOM_CREATED,
            InboundMessage::RoomJoined(_) => kinds::ROOM_JOINED,
            InboundMessage::RoomLeft => kinds::ROOM_LEFT,
            InboundMessage::RoomStateUpdate(_) => kinds::ROOM_STATE_UPDATE,
            InboundMessage::RoomList(_) => kinds::ROOM_LIST,
            InboundMessage::GameStarted(_) => kinds::GAME_STARTED,
            InboundMessage::StateSync(_) => kinds::STATE_SYNC,
            InboundMessage::StateDiff(_) => kinds::STATE_DIFF,
            InboundMessage::SyncRequested(_) => kinds::REQUEST_SYNC,
            InboundMessage::PlayerAction(_) => kinds::PLAYER_ACTION,
            InboundMessage::Error(_) => kinds::ERROR,
        }
    }
}

/// Messages sent to the relay
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Connect(ConnectRequest),
    CreateRoom(CreateRoomRequest),
    JoinRoom(JoinRoomRequest),
    LeaveRoom,
    PlayerReady(PlayerReadyRequest),
    RequestRoomList,
    PlayerAction(PlayerActionRequest),
    StateSync(StateSyncPayload),
    StateDiff(StateDiffPayload),
    RequestSync(SyncRequestPayload),
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Connect(_) => kinds::CONNECT,
            OutboundMessage::CreateRoom(_) => kinds::CREATE_ROOM,
            OutboundMessage::JoinRoom(_) => kinds::JOIN_ROOM,
            OutboundMessage::LeaveRoom => kinds::LEAVE_ROOM,
            OutboundMessage::PlayerReady(_) => kinds::PLAYER_READY,
            OutboundMessage::RequestRoomList => kinds::REQUEST_ROOM_LIST,
            OutboundMessage::PlayerAction(_) => kinds::PLAYER_ACTION,
            OutboundMessage::StateSync(_) => kinds::STATE_SYNC,
            OutboundMessage::StateDiff(_) => kinds::STATE_DIFF,
            OutboundMessage::RequestSync(_) => kinds::REQUEST_SYNC,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let kind = self.kind();
        match self {
            OutboundMessage::Connect(p) => Envelope::encode(kind, p),
            OutboundMessage::CreateRoom(p) => Envelope::encode(kind, p),
            OutboundMessage::JoinRoom(p) => Envelope::encode(kind, p),
            OutboundMessage::LeaveRoom | OutboundMessage::RequestRoomList => {
                Ok(Envelope::new(kind, Value::Object(Default::default())))
            }
            OutboundMessage::PlayerReady(p) => Envelope::encode(kind, p),
            OutboundMessage::PlayerAction(p) => Envelope::encode(kind, p),
            OutboundMessage::StateSync(p) => Envelope::encode(kind, p),
            OutboundMessage::StateDiff(p) => Envelope::encode(kind, p),
            OutboundMessage::RequestSync(p) => Envelope::encode(kind, p),
        }
    }
}

/// Message statistics for debugging/monitoring
#[derive(Debug, Default, Clone)]
pub struct MessageStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Envelopes that waited in the offline queue
    pub messages_queued: u64,
    pub reconnects: u64,
    pub dropped_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let msg = OutboundMessage::JoinRoom(JoinRoomRequest {
            room_id: "room-1".to_string(),
        });

        let text = msg.to_envelope().unwrap().to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "joinRoom", "data": {"roomId": "room-1"}}));
    }

    #[test]
    fn test_classify_unknown_type() {
        let envelope = Envelope::new("teleport", json!({}));
        match InboundMessage::from_envelope(&envelope) {
            Err(ProtocolError::UnknownType(kind)) => assert_eq!(kind, "teleport"),
            other => panic!("expected unknown type, got {other:?}"),
        }
    }

    #[test]
    fn test_room_left_without_data() {
        let envelope = Envelope::from_text(r#"{"type":"roomLeft"}"#).unwrap();
        assert_eq!(
            InboundMessage::from_envelope(&envelope).unwrap(),
            InboundMessage::RoomLeft
        );
    }

    #[test]
    fn test_player_action_origin_falls_back_to_sender() {
        let payload = PlayerActionPayload {
            player_id: None,
            action: ActionEnvelope {
                kind: "characterPosition".to_string(),
                data: json!({"senderId": "p2"}),
            },
        };
        assert_eq!(payload.origin(), Some("p2"));
    }

    #[test]
    fn test_error_payload_codes() {
        let envelope = Envelope::new("error", json!({"code": "ROOM_FULL", "message": "full"}));
        match InboundMessage::from_envelope(&envelope).unwrap() {
            InboundMessage::Error(e) => {
                assert_eq!(e.code, ErrorCode::RoomFull);
                assert_eq!(e.message, "full");
            }
            other => panic!("expected error, got {other:?}"),
        }

        let envelope = Envelope::new("error", json!({"code": "SERVER_ON_FIRE"}));
        match InboundMessage::from_envelope(&envelope).unwrap() {
            InboundMessage::Error(e) => assert_eq!(e.code, ErrorCode::Unknown),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_payload_reports_kind() {
        let envelope = Envelope::new("connect", json!({"nope": 1}));
        match InboundMessage::from_envelope(&envelope) {
            Err(ProtocolError::InvalidPayload { kind, .. }) => assert_eq!(kind, "connect"),
            other => panic!("expected invalid payload, got {other:?}"),
        }
    }
}
