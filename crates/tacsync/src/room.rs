//! Room membership as reported by the relay

use tacsync_network::{
    CreateRoomRequest, JoinRoomRequest, OutboundMessage, PlayerReadyRequest, RoomInfo, RoomMember,
    RoomStatus,
};
use tracing::{debug, warn};

/// Projection of the room this peer is in, plus the last listing
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    current: Option<RoomInfo>,
    listing: Vec<RoomInfo>,
    ready: bool,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, name: &str, capacity: u8) -> OutboundMessage {
        OutboundMessage::CreateRoom(CreateRoomRequest {
            name: name.to_string(),
            max_players: capacity,
        })
    }

    pub fn join(&self, room_id: &str) -> OutboundMessage {
        OutboundMessage::JoinRoom(JoinRoomRequest {
            room_id: room_id.to_string(),
        })
    }

    pub fn leave(&self) -> OutboundMessage {
        OutboundMessage::LeaveRoom
    }

    pub fn set_ready(&mut self, ready: bool) -> OutboundMessage {
        self.ready = ready;
        OutboundMessage::PlayerReady(PlayerReadyRequest { ready })
    }

    pub fn request_list(&self) -> OutboundMessage {
        OutboundMessage::RequestRoomList
    }

    /// `roomCreated` / `roomJoined`
    pub fn entered(&mut self, room: RoomInfo) {
        debug!("Entered room {} ({})", room.id, room.name);
        self.ready = false;
        self.current = Some(room);
    }

    /// `roomStateUpdate`; status never moves backwards
    pub fn update(&mut self, mut room: RoomInfo) {
        let Some(current) = self.current.as_mut() else {
            debug!("Ignoring update for room {} while not in a room", room.id);
            return;
        };
        if current.id != room.id {
            debug!("Ignoring update for foreign room {}", room.id);
            return;
        }
        if room.status < current.status {
            warn!(
                "Room {} status would regress from {:?} to {:?}",
                room.id, current.status, room.status
            );
            room.status = current.status;
        }
        *current = room;
    }

    pub fn advance(&mut self, status: RoomStatus) {
        if let Some(current) = self.current.as_mut() {
            if status > current.status {
                current.status = status;
            }
        }
    }

    pub fn left(&mut self) {
        self.current = None;
        self.ready = false;
    }

    pub fn set_listing(&mut self, rooms: Vec<RoomInfo>) {
        self.listing = rooms;
    }

    pub fn current(&self) -> Option<&RoomInfo> {
        self.current.as_ref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.current.as_ref().map(|r| r.id.as_str())
    }

    pub fn status(&self) -> Option<RoomStatus> {
        self.current.as_ref().map(|r| r.status)
    }

    pub fn members(&self) -> &[RoomMember] {
        self.current
            .as_ref()
            .map(|r| r.players.as_slice())
            .unwrap_or_default()
    }

    pub fn listing(&self) -> &[RoomInfo] {
        &self.listing
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(status: RoomStatus) -> RoomInfo {
        RoomInfo {
            id: "r1".to_string(),
            name: "Ops".to_string(),
            max_players: 2,
            players: vec![RoomMember {
                id: "p1".to_string(),
                name: "Alice".to_string(),
                ready: false,
            }],
            status,
            host_id: Some("p1".to_string()),
        }
    }

    #[test]
    fn test_status_is_forward_only() {
        let mut directory = RoomDirectory::new();
        directory.entered(room(RoomStatus::Waiting));

        directory.update(room(RoomStatus::Playing));
        assert_eq!(directory.status(), Some(RoomStatus::Playing));

        directory.update(room(RoomStatus::Waiting));
        assert_eq!(directory.status(), Some(RoomStatus::Playing));

        directory.advance(RoomStatus::Starting);
        assert_eq!(directory.status(), Some(RoomStatus::Playing));
        directory.advance(RoomStatus::Finished);
        assert_eq!(directory.status(), Some(RoomStatus::Finished));
    }

    #[test]
    fn test_updates_for_other_rooms_are_ignored() {
        let mut directory = RoomDirectory::new();
        directory.entered(room(RoomStatus::Waiting));

        let mut other = room(RoomStatus::Playing);
        other.id = "r2".to_string();
        directory.update(other);

        assert_eq!(directory.room_id(), Some("r1"));
        assert_eq!(directory.status(), Some(RoomStatus::Waiting));
    }

    #[test]
    fn test_requests() {
        let mut directory = RoomDirectory::new();
        assert_eq!(
            directory.create("Ops", 4),
            OutboundMessage::CreateRoom(CreateRoomRequest {
                name: "Ops".to_string(),
                max_players: 4,
            })
        );
        assert_eq!(
            directory.set_ready(true),
            OutboundMessage::PlayerReady(PlayerReadyRequest { ready: true })
        );
        assert!(directory.is_ready());

        directory.entered(room(RoomStatus::Waiting));
        assert!(!directory.is_ready());
        assert_eq!(directory.members().len(), 1);

        directory.left();
        assert!(directory.current().is_none());
        assert!(directory.members().is_empty());
    }
}
