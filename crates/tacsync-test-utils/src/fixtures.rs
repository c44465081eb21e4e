use serde_json::json;
use tacsync::MutationEvent;
use tacsync_network::{Envelope, RoomInfo, RoomMember, RoomStatus};
use tacsync_state::{Character, GameInfo, MapGrid, PlayerMeta, Pool, Position, SharedState, Terrain};

pub const ROOM_ID: &str = "room-1";

pub fn character(name: &str, owner: &str, x: i32, y: i32) -> Character {
    Character {
        name: name.to_string(),
        owner: owner.to_string(),
        position: Position::new(x, y),
        health: Pool::full(10),
        action_points: Pool::full(4),
        ..Default::default()
    }
}

/// Turn `p1`; `alpha` (p1) at (20,25) and `bravo` (p2) at (25,25)
pub fn two_player_state() -> SharedState {
    let mut map = MapGrid::filled(40, 40, Terrain::Floor);
    let characters = vec![character("alpha", "p1", 20, 25), character("bravo", "p2", 25, 25)];
    for c in &characters {
        if let Some(cell) = map.cell_mut(c.position) {
            cell.occupant = Some(c.name.clone());
        }
    }

    SharedState {
        game: GameInfo {
            turn: "p1".to_string(),
            players: vec!["p1".to_string(), "p2".to_string()],
            player_info: [("p1", "Alice"), ("p2", "Bob")]
                .into_iter()
                .map(|(id, name)| {
                    (
                        id.to_string(),
                        PlayerMeta {
                            name: name.to_string(),
                            is_ai: false,
                        },
                    )
                })
                .collect(),
        },
        characters,
        map,
        ..Default::default()
    }
}

pub fn member(id: &str, name: &str) -> RoomMember {
    RoomMember {
        id: id.to_string(),
        name: name.to_string(),
        ready: false,
    }
}

/// Room hosted by `p1` with both players present
pub fn room_info() -> RoomInfo {
    RoomInfo {
        id: ROOM_ID.to_string(),
        name: "Ops".to_string(),
        max_players: 2,
        players: vec![member("p1", "Alice"), member("p2", "Bob")],
        status: RoomStatus::Waiting,
        host_id: Some("p1".to_string()),
    }
}

pub fn room_created() -> Envelope {
    let mut room = room_info();
    room.players.truncate(1);
    Envelope::new("roomCreated", json!({ "room": room_json(&room) }))
}

pub fn room_joined() -> Envelope {
    Envelope::new("roomJoined", json!({ "room": room_json(&room_info()) }))
}

/// The relay's view of another player's action
pub fn player_action(player_id: &str, event: &MutationEvent) -> Envelope {
    let action = event.to_action(player_id).expect("encode action");
    Envelope::new(
        "playerAction",
        json!({ "playerId": player_id, "action": { "type": action.kind, "data": action.data } }),
    )
}

fn room_json(room: &RoomInfo) -> serde_json::Value {
    serde_json::to_value(room).expect("encode room")
}
