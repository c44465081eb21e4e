//! Network transport layer for Tacsync
//!
//! Carries JSON `{type, data}` envelopes to and from a room relay, queues
//! outbound traffic while the link is down and reconnects with a bounded
//! backoff.

pub mod adapter;
pub mod connection;
pub mod protocol;
pub mod transport;

pub use adapter::{ConnectedTransport, TransportAdapter, TransportEvent, TransportHandle};
pub use connection::{WsChannel, WsConnector};
pub use protocol::{
    kinds, ActionEnvelope, ConnectAck, ConnectRequest, CreateRoomRequest, Envelope, ErrorCode,
    ErrorPayload, GameStartedPayload, InboundMessage, JoinRoomRequest, MessageStats,
    OutboundMessage, PlayerActionPayload, PlayerActionRequest, PlayerReadyRequest, RoomInfo,
    RoomListPayload, RoomMember, RoomPayload, RoomStatus, StateDiffPayload, StateSyncPayload,
    SyncRequestPayload,
};
pub use transport::{Channel, Connector, TransportConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Timeout waiting for connect acknowledgement")]
    Timeout,

    /// The transport gave up; no further traffic is possible
    #[error("Disconnected")]
    Disconnected,

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for NetworkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        NetworkError::WebSocket(Box::new(e))
    }
}

/// Envelope encoding and classification failures
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
}
