//! In-memory room relay speaking the relay side of the envelope protocol
//!
//! Assigns ids `p1`, `p2`, ... in connection order, manages rooms, stamps
//! relayed `playerAction`s with the sender and forwards host snapshots to the
//! other members.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tacsync_network::{
    kinds, ConnectRequest, CreateRoomRequest, Envelope, ErrorCode, JoinRoomRequest,
    NetworkError, PlayerActionPayload, PlayerActionRequest, PlayerReadyRequest, RoomInfo,
    RoomMember, RoomStatus, Channel, Connector,
};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<Mutex<RelayState>>,
}

#[derive(Default)]
struct RelayState {
    next_id: u64,
    clients: HashMap<String, Client>,
    rooms: BTreeMap<String, RoomInfo>,
    opened: usize,
}

struct Client {
    name: String,
    tx: mpsc::UnboundedSender<String>,
    room: Option<String>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RelayState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn rooms(&self) -> Vec<RoomInfo> {
        self.state().rooms.values().cloned().collect()
    }

    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Channels opened so far, reconnects included
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    /// Drop a client's socket as if the network failed; room membership is kept
    pub fn sever(&self, client_id: &str) {
        if let Some(client) = self.state().clients.get_mut(client_id) {
            let (dead, _) = mpsc::unbounded_channel();
            client.tx = dead;
        }
    }
}

#[async_trait]
impl Connector for MemoryRelay {
    async fn open(&self, _endpoint: &str) -> Result<Box<dyn Channel>, NetworkError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().opened += 1;
        Ok(Box::new(RelayChannel {
            relay: self.clone(),
            id: None,
            pending: Some(tx),
            rx,
        }))
    }
}

struct RelayChannel {
    relay: MemoryRelay,
    id: Option<String>,
    /// Held until the handshake registers it with the relay
    pending: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Channel for RelayChannel {
    async fn send(&mut self, text: String) -> Result<(), NetworkError> {
        let envelope = Envelope::from_text(&text)?;
        let mut state = self.relay.state();

        let Some(id) = self.id.clone() else {
            if envelope.kind != kinds::CONNECT {
                return Err(NetworkError::TransportError("handshake required".to_string()));
            }
            let hello: ConnectRequest = envelope.decode()?;
            let tx = self
                .pending
                .take()
                .ok_or_else(|| NetworkError::TransportError("channel reused".to_string()))?;
            state.next_id += 1;
            let id = format!("p{}", state.next_id);
            debug!("Relay assigned {} to {}", id, hello.name);
            state.clients.insert(
                id.clone(),
                Client {
                    name: hello.name,
                    tx,
                    room: None,
                },
            );
            state.deliver(&id, kinds::CONNECT, json!({ "id": id }));
            self.id = Some(id);
            return Ok(());
        };

        if state.clients.get(&id).map_or(true, |c| c.tx.is_closed()) {
            return Err(NetworkError::TransportError("connection reset".to_string()));
        }
        state.handle(&id, envelope);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, NetworkError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), NetworkError> {
        if let Some(id) = self.id.take() {
            let mut state = self.relay.state();
            state.leave_room(&id);
            state.clients.remove(&id);
        }
        Ok(())
    }
}

impl RelayState {
    fn deliver(&self, to: &str, kind: &str, data: Value) {
        let Some(client) = self.clients.get(to) else {
            return;
        };
        match Envelope::new(kind, data).to_text() {
            Ok(text) => {
                let _ = client.tx.send(text);
            }
            Err(e) => debug!("Relay could not encode {}: {}", kind, e),
        }
    }

    fn error(&self, to: &str, code: ErrorCode, message: &str) {
        self.deliver(
            to,
            kinds::ERROR,
            json!({ "code": code.as_str(), "message": message }),
        );
    }

    /// Deliver to every member of `room_id` except `except`
    fn broadcast(&self, room_id: &str, except: Option<&str>, kind: &str, data: Value) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        for member in room.players.iter().filter(|m| Some(m.id.as_str()) != except) {
            self.deliver(&member.id, kind, data.clone());
        }
    }

    fn room_of(&self, id: &str) -> Option<String> {
        self.clients.get(id).and_then(|c| c.room.clone())
    }

    fn room_json(&self, room_id: &str) -> Value {
        json!({ "room": self.rooms.get(room_id) })
    }

    fn handle(&mut self, from: &str, envelope: Envelope) {
        let result = match envelope.kind.as_str() {
            kinds::CREATE_ROOM => envelope.decode().map(|req| self.create_room(from, req)),
            kinds::JOIN_ROOM => envelope.decode().map(|req| self.join_room(from, req)),
            kinds::LEAVE_ROOM => {
                self.leave_room(from);
                self.deliver(from, kinds::ROOM_LEFT, json!({}));
                Ok(())
            }
            kinds::PLAYER_READY => envelope.decode().map(|req| self.set_ready(from, req)),
            kinds::REQUEST_ROOM_LIST => {
                let rooms: Vec<&RoomInfo> = self.rooms.values().collect();
                self.deliver(from, kinds::ROOM_LIST, json!({ "rooms": rooms }));
                Ok(())
            }
            kinds::PLAYER_ACTION => envelope
                .decode()
                .map(|req: PlayerActionRequest| self.relay_action(from, req)),
            kinds::STATE_SYNC | kinds::STATE_DIFF => {
                self.relay_snapshot(from, &envelope);
                Ok(())
            }
            kinds::REQUEST_SYNC => {
                self.forward_sync_request(from);
                Ok(())
            }
            other => {
                self.error(from, ErrorCode::InvalidAction, &format!("unsupported {other}"));
                Ok(())
            }
        };

        if let Err(e) = result {
            self.error(from, ErrorCode::InvalidAction, &e.to_string());
        }
    }

    fn create_room(&mut self, from: &str, req: CreateRoomRequest) {
        self.leave_room(from);
        let room_id = uuid::Uuid::new_v4().to_string();
        let name = self
            .clients
            .get(from)
            .map(|c| c.name.clone())
            .unwrap_or_default();

        self.rooms.insert(
            room_id.clone(),
            RoomInfo {
                id: room_id.clone(),
                name: req.name,
                max_players: req.max_players,
                players: vec![RoomMember {
                    id: from.to_string(),
                    name,
                    ready: false,
                }],
                status: RoomStatus::Waiting,
                host_id: Some(from.to_string()),
            },
        );
        if let Some(client) = self.clients.get_mut(from) {
            client.room = Some(room_id.clone());
        }
        self.deliver(from, kinds::ROOM_CREATED, self.room_json(&room_id));
    }

    fn join_room(&mut self, from: &str, req: JoinRoomRequest) {
        let name = self
            .clients
            .get(from)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let Some(room) = self.rooms.get_mut(&req.room_id) else {
            self.error(from, ErrorCode::RoomNotFound, "no such room");
            return;
        };
        if room.players.len() >= room.max_players as usize {
            self.error(from, ErrorCode::RoomFull, "room is full");
            return;
        }
        if room.status != RoomStatus::Waiting {
            self.error(from, ErrorCode::InvalidAction, "game already started");
            return;
        }

        room.players.push(RoomMember {
            id: from.to_string(),
            name,
            ready: false,
        });
        if let Some(client) = self.clients.get_mut(from) {
            client.room = Some(req.room_id.clone());
        }

        let update = self.room_json(&req.room_id);
        self.deliver(from, kinds::ROOM_JOINED, update.clone());
        self.broadcast(&req.room_id, Some(from), kinds::ROOM_STATE_UPDATE, update);
    }

    fn leave_room(&mut self, from: &str) {
        let Some(room_id) = self.room_of(from) else {
            return;
        };
        if let Some(client) = self.clients.get_mut(from) {
            client.room = None;
        }

        let empty = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.players.retain(|m| m.id != from);
                if room.host_id.as_deref() == Some(from) {
                    room.host_id = room.players.first().map(|m| m.id.clone());
                }
                room.players.is_empty()
            }
            None => return,
        };

        if empty {
            self.rooms.remove(&room_id);
        } else {
            let update = self.room_json(&room_id);
            self.broadcast(&room_id, None, kinds::ROOM_STATE_UPDATE, update);
        }
    }

    fn set_ready(&mut self, from: &str, req: PlayerReadyRequest) {
        let Some(room_id) = self.room_of(from) else {
            self.error(from, ErrorCode::RoomNotFound, "not in a room");
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        for member in room.players.iter_mut().filter(|m| m.id == from) {
            member.ready = req.ready;
        }

        let start = room.status == RoomStatus::Waiting
            && room.players.len() >= 2
            && room.players.iter().all(|m| m.ready);
        if start {
            room.status = RoomStatus::Starting;
        }
        let update = self.room_json(&room_id);
        self.broadcast(&room_id, None, kinds::ROOM_STATE_UPDATE, update);

        if start {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                room.status = RoomStatus::Playing;
            }
            let update = self.room_json(&room_id);
            self.broadcast(&room_id, None, kinds::ROOM_STATE_UPDATE, update);
            self.broadcast(
                &room_id,
                None,
                kinds::GAME_STARTED,
                json!({ "roomId": room_id, "state": null }),
            );
        }
    }

    fn relay_action(&self, from: &str, req: PlayerActionRequest) {
        let Some(room_id) = self.room_of(from) else {
            self.error(from, ErrorCode::RoomNotFound, "not in a room");
            return;
        };
        let payload = PlayerActionPayload {
            player_id: Some(from.to_string()),
            action: req.action,
        };
        match serde_json::to_value(&payload) {
            Ok(data) => self.broadcast(&room_id, Some(from), kinds::PLAYER_ACTION, data),
            Err(e) => self.error(from, ErrorCode::InvalidAction, &e.to_string()),
        }
    }

    fn relay_snapshot(&self, from: &str, envelope: &Envelope) {
        let Some(room_id) = self.room_of(from) else {
            return;
        };
        let is_host = self
            .rooms
            .get(&room_id)
            .is_some_and(|r| r.host_id.as_deref() == Some(from));
        if !is_host {
            self.error(from, ErrorCode::InvalidAction, "only the host sends snapshots");
            return;
        }
        self.broadcast(&room_id, Some(from), &envelope.kind, envelope.data.clone());
    }

    fn forward_sync_request(&self, from: &str) {
        let Some(room_id) = self.room_of(from) else {
            return;
        };
        if let Some(host) = self.rooms.get(&room_id).and_then(|r| r.host_id.clone()) {
            self.deliver(
                &host,
                kinds::REQUEST_SYNC,
                json!({ "roomId": room_id, "playerId": from }),
            );
        }
    }
}
