//! Synchronization coordinator
//!
//! Owns the role (single-player, host or guest), the live store, the sync
//! baseline and the room projection for one participant. Every handler runs to
//! completion on `&mut self`; the session task serializes calls.

use crate::board;
use crate::config::SyncConfig;
use crate::events::{Authority, CoordinatorEvent, EventBus, MutationEvent, Role, TaggedEvent};
use crate::explode::explode;
use crate::room::RoomDirectory;
use crate::store::{GameStore, MutationError};
use crate::SyncError;
use serde_json::Value;
use tacsync_network::{
    Envelope, InboundMessage, NetworkError, OutboundMessage, PlayerActionPayload,
    PlayerActionRequest, ProtocolError, RoomStatus, StateDiffPayload, StateSyncPayload,
    SyncRequestPayload, TransportEvent, TransportHandle,
};
use tacsync_state::{Diff, DiffEngine, PlayerId, SharedState, StateError, StateSynchronizer, StateUpdate};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Where the coordinator sends outbound traffic
pub trait Outbound {
    fn send(&self, message: &OutboundMessage) -> Result<(), NetworkError>;

    /// Close the link gracefully
    fn close(&self) -> Result<(), NetworkError> {
        Ok(())
    }
}

impl Outbound for TransportHandle {
    fn send(&self, message: &OutboundMessage) -> Result<(), NetworkError> {
        self.send_message(message)
    }

    fn close(&self) -> Result<(), NetworkError> {
        self.disconnect()
    }
}

pub struct Coordinator<O> {
    config: SyncConfig,
    outbound: O,
    local_id: Option<PlayerId>,
    role: Role,
    store: GameStore,
    sync: StateSynchronizer,
    room: RoomDirectory,
    bus: EventBus,
}

impl<O: Outbound> Coordinator<O> {
    pub fn new(config: SyncConfig, outbound: O) -> Self {
        let sync = StateSynchronizer::new(DiffEngine::default(), config.filter_ui);
        let bus = EventBus::new(config.event_capacity);
        Self {
            config,
            outbound,
            local_id: None,
            role: Role::SinglePlayer,
            store: GameStore::default(),
            sync,
            room: RoomDirectory::new(),
            bus,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.bus.subscribe()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The host runs the periodic sync tick
    pub fn is_syncing(&self) -> bool {
        self.role == Role::Host
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn set_local_id(&mut self, id: impl Into<PlayerId>) {
        self.local_id = Some(id.into());
    }

    pub fn state(&self) -> &SharedState {
        self.store.state()
    }

    pub fn baseline(&self) -> Option<&SharedState> {
        self.sync.baseline()
    }

    pub fn room(&self) -> &RoomDirectory {
        &self.room
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn outbound(&self) -> &O {
        &self.outbound
    }

    pub fn publish(&self, event: CoordinatorEvent) {
        self.bus.publish(event);
    }

    /// Replace the live state, e.g. with a freshly generated board
    pub fn load_state(&mut self, state: SharedState) {
        self.store.load(state);
        self.bus.publish(CoordinatorEvent::FullResync);
    }

    /// Apply a locally originated mutation, subject to turn authority
    pub fn submit_local(&mut self, event: MutationEvent) -> Result<(), SyncError> {
        self.dispatch(TaggedEvent::local(event))
    }

    /// End the local turn, passing it to the next player in order
    pub fn end_turn(&mut self) -> Result<(), SyncError> {
        let next = self
            .state()
            .next_player()
            .cloned()
            .ok_or_else(|| MutationError::UnknownPlayer(self.state().game.turn.clone()))?;
        self.submit_local(MutationEvent::TurnChanged { player: next })
    }

    /// The single mutation pipeline for local and network events
    pub fn dispatch(&mut self, tagged: TaggedEvent) -> Result<(), SyncError> {
        let local = !tagged.origin.from_network();
        if local {
            self.authorize(&tagged.event)?;
        }

        self.store.apply(&tagged.event)?;

        if local && tagged.event.is_broadcast() && self.role != Role::SinglePlayer {
            self.broadcast_action(&tagged.event)?;
        }

        self.bus.publish(CoordinatorEvent::Mutation(tagged));
        Ok(())
    }

    fn authorize(&self, event: &MutationEvent) -> Result<(), SyncError> {
        let state = self.store.state();
        match event.authority() {
            Authority::Anyone => Ok(()),
            Authority::TurnHolder => self.check_local_turn(),
            Authority::Character(name) => {
                self.check_local_turn()?;
                let character = state
                    .character(name)
                    .ok_or_else(|| MutationError::UnknownCharacter(name.to_string()))?;
                if state.is_turn_of(&character.owner) {
                    Ok(())
                } else {
                    Err(SyncError::NotYourTurn {
                        player: character.owner.clone(),
                        turn: state.game.turn.clone(),
                    })
                }
            }
        }
    }

    fn check_local_turn(&self) -> Result<(), SyncError> {
        if self.role == Role::SinglePlayer {
            return Ok(());
        }
        let state = self.store.state();
        match self.local_id.as_deref() {
            Some(id) if state.is_turn_of(id) => Ok(()),
            other => Err(SyncError::NotYourTurn {
                player: other.unwrap_or_default().to_string(),
                turn: state.game.turn.clone(),
            }),
        }
    }

    fn broadcast_action(&self, event: &MutationEvent) -> Result<(), SyncError> {
        let sender = self.local_id.as_deref().unwrap_or_default();
        let action = event
            .to_action(sender)
            .map_err(|e| StateError::SerializationError(e.to_string()))?;
        self.outbound
            .send(&OutboundMessage::PlayerAction(PlayerActionRequest { action }))?;
        Ok(())
    }

    /// Host tick: full snapshot without a baseline, else a UI-filtered diff.
    /// Returns whether anything was sent.
    pub fn tick(&mut self) -> Result<bool, SyncError> {
        if self.role != Role::Host {
            return Ok(false);
        }
        // Pre-game lobby state has no turn holder yet
        if let Err(e) = self.store.state().validate() {
            debug!("Not syncing unplayable state: {}", e);
            return Ok(false);
        }

        let room_id = self.room.room_id().unwrap_or_default().to_string();
        let message = match self.sync.update_state(self.store.state())? {
            None => return Ok(false),
            Some(StateUpdate::FullState { seq, state }) => {
                debug!("Broadcasting stateSync seq={}", seq);
                OutboundMessage::StateSync(StateSyncPayload {
                    room_id,
                    state: to_value(&state)?,
                    timestamp: Envelope::timestamp_now(),
                })
            }
            Some(StateUpdate::Delta { seq, diff }) => {
                debug!("Broadcasting stateDiff seq={} ({} patches)", seq, diff.len());
                OutboundMessage::StateDiff(StateDiffPayload {
                    room_id,
                    diff: to_value(&diff)?,
                    timestamp: Envelope::timestamp_now(),
                })
            }
        };

        self.outbound.send(&message)?;
        Ok(true)
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), SyncError> {
        match event {
            TransportEvent::Envelope(envelope) => self.handle_envelope(&envelope),
            TransportEvent::ConnectionLost { reason } => {
                warn!("Relay connection lost: {}", reason);
                self.bus.publish(CoordinatorEvent::ConnectionLost { reason });
                Ok(())
            }
            TransportEvent::Reconnected { network_id } => {
                info!("Reconnected as {}", network_id);
                self.local_id = Some(network_id.clone());
                match self.role {
                    Role::Host => self.sync.reset(),
                    Role::Guest => self.request_sync()?,
                    Role::SinglePlayer => {}
                }
                self.bus.publish(CoordinatorEvent::Reconnected { network_id });
                Ok(())
            }
            TransportEvent::Disconnected { graceful, reason } => {
                if graceful {
                    info!("Disconnected from relay");
                } else {
                    warn!(
                        "Relay unreachable: {}",
                        reason.as_deref().unwrap_or("retries exhausted")
                    );
                }
                self.leave_session();
                self.bus.publish(CoordinatorEvent::Disconnected);
                Ok(())
            }
        }
    }

    /// Classify and handle one inbound envelope; unknown types are dropped
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Result<(), SyncError> {
        match InboundMessage::from_envelope(envelope) {
            Ok(message) => self.handle_inbound(message),
            Err(ProtocolError::UnknownType(kind)) => {
                warn!("Dropping envelope of unknown type {:?}", kind);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn handle_inbound(&mut self, message: InboundMessage) -> Result<(), SyncError> {
        debug!("Inbound {}", message.kind());
        match message {
            InboundMessage::Connect(ack) => {
                self.local_id = Some(ack.id);
            }
            InboundMessage::RoomCreated(payload) => {
                self.room.entered(payload.room);
                self.set_role(Role::Host);
            }
            InboundMessage::RoomJoined(payload) => {
                self.room.entered(payload.room);
                self.set_role(Role::Guest);
            }
            InboundMessage::RoomLeft => {
                self.leave_session();
            }
            InboundMessage::RoomStateUpdate(payload) => {
                let known: Vec<String> =
                    self.room.members().iter().map(|m| m.id.clone()).collect();
                let newcomer = payload
                    .room
                    .players
                    .iter()
                    .any(|m| !known.contains(&m.id));
                self.room.update(payload.room);
                if newcomer && self.role == Role::Host {
                    debug!("New room member; next tick sends a full snapshot");
                    self.sync.reset();
                }
                self.bus.publish(CoordinatorEvent::RoomChanged);
            }
            InboundMessage::RoomList(payload) => {
                self.room.set_listing(payload.rooms);
                self.bus.publish(CoordinatorEvent::RoomChanged);
            }
            InboundMessage::GameStarted(payload) => self.on_game_started(payload.state)?,
            InboundMessage::StateSync(payload) => self.on_state_sync(payload)?,
            InboundMessage::StateDiff(payload) => self.on_state_diff(payload)?,
            InboundMessage::SyncRequested(payload) => self.on_sync_requested(payload),
            InboundMessage::PlayerAction(payload) => self.on_player_action(payload)?,
            InboundMessage::Error(payload) => {
                warn!("Relay error {}: {}", payload.code.as_str(), payload.message);
                self.bus.publish(CoordinatorEvent::RemoteError {
                    code: payload.code,
                    message: payload.message,
                });
            }
        }
        Ok(())
    }

    fn set_role(&mut self, role: Role) {
        if self.role == role {
            return;
        }
        info!("Role {:?} -> {:?}", self.role, role);
        self.role = role;
        self.sync.reset();
        self.bus.publish(CoordinatorEvent::RoleChanged(role));
    }

    /// Back to single-player: no tick, no baseline, no room
    fn leave_session(&mut self) {
        self.room.left();
        self.set_role(Role::SinglePlayer);
    }

    fn on_game_started(&mut self, state: Value) -> Result<(), SyncError> {
        self.room.advance(RoomStatus::Playing);

        let state = if !state.is_null() {
            from_value(state)?
        } else if self.role == Role::Host {
            info!("Generating board for {} players", self.room.members().len());
            board::skirmish(self.room.members(), Envelope::timestamp_now())
        } else {
            return Ok(());
        };

        if let Err(e) = state.validate() {
            warn!("Rejecting starting board: {}", e);
            if self.role == Role::Guest {
                self.request_sync()?;
            }
            return Ok(());
        }

        self.sync.reset();
        self.store.load(state);
        self.bus.publish(CoordinatorEvent::FullResync);
        Ok(())
    }

    fn on_state_sync(&mut self, payload: StateSyncPayload) -> Result<(), SyncError> {
        if self.role != Role::Guest {
            debug!("Ignoring stateSync while {:?}", self.role);
            return Ok(());
        }

        let state = from_value(payload.state)?;
        if let Err(e) = state.validate() {
            warn!("Rejecting stateSync: {}", e);
            self.sync.reset();
            return self.request_sync();
        }
        self.sync.apply_sync(state.clone());
        self.store.adopt(state);
        self.bus.publish(CoordinatorEvent::FullResync);
        Ok(())
    }

    fn on_state_diff(&mut self, payload: StateDiffPayload) -> Result<(), SyncError> {
        if self.role != Role::Guest {
            debug!("Ignoring stateDiff while {:?}", self.role);
            return Ok(());
        }

        if !self.sync.has_baseline() {
            warn!("stateDiff before any stateSync; requesting a full sync");
            return self.request_sync();
        }

        let diff = match decode_diff(payload.diff) {
            Ok(diff) => diff,
            Err(e) => {
                warn!("Undecodable stateDiff: {}", e);
                self.sync.reset();
                return self.request_sync();
            }
        };

        let previous = match self.sync.apply_update(&diff) {
            Ok(Some(previous)) => previous,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Discarding baseline: {}", e);
                return self.request_sync();
            }
        };

        let Some(next) = self.sync.baseline().cloned() else {
            return self.request_sync();
        };

        // Roster changes have no event form; take the snapshot whole
        if previous.game.players != next.game.players
            || previous.game.player_info != next.game.player_info
        {
            info!("Player roster changed; adopting host state");
            self.store.adopt(next);
            self.bus.publish(CoordinatorEvent::FullResync);
            return Ok(());
        }

        let host = self.room.current().and_then(|r| r.host_id.clone());
        for event in explode(&previous, &next) {
            if let Err(e) = self.dispatch(TaggedEvent::network(event, host.clone())) {
                warn!("Replayed event did not apply to live state: {}", e);
            }
        }
        self.store.adopt(next);
        Ok(())
    }

    fn on_sync_requested(&mut self, payload: SyncRequestPayload) {
        if self.role != Role::Host {
            return;
        }
        info!(
            "Full sync requested by {}",
            payload.player_id.as_deref().unwrap_or("a guest")
        );
        self.sync.reset();
    }

    fn on_player_action(&mut self, payload: PlayerActionPayload) -> Result<(), SyncError> {
        let origin = payload.origin().map(str::to_string);
        if origin.is_some() && origin.as_deref() == self.local_id.as_deref() {
            debug!("Dropping own {} echo", payload.action.kind);
            return Ok(());
        }

        let event = match MutationEvent::from_action(&payload.action) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping unrecognised action {}: {}", payload.action.kind, e);
                return Ok(());
            }
        };

        self.dispatch(TaggedEvent::network(event, origin))
    }

    fn request_sync(&mut self) -> Result<(), SyncError> {
        let message = OutboundMessage::RequestSync(SyncRequestPayload {
            room_id: self.room.room_id().map(str::to_string),
            player_id: self.local_id.clone(),
        });
        self.outbound.send(&message)?;
        Ok(())
    }

    pub fn create_room(&mut self, name: &str, capacity: u8) -> Result<(), SyncError> {
        let message = self.room.create(name, capacity);
        self.outbound.send(&message)?;
        Ok(())
    }

    pub fn join_room(&mut self, room_id: &str) -> Result<(), SyncError> {
        let message = self.room.join(room_id);
        self.outbound.send(&message)?;
        Ok(())
    }

    /// Ask to leave; the role changes once the relay confirms with `roomLeft`
    pub fn leave_room(&mut self) -> Result<(), SyncError> {
        let message = self.room.leave();
        self.outbound.send(&message)?;
        Ok(())
    }

    pub fn set_ready(&mut self, ready: bool) -> Result<(), SyncError> {
        let message = self.room.set_ready(ready);
        self.outbound.send(&message)?;
        Ok(())
    }

    pub fn request_room_list(&mut self) -> Result<(), SyncError> {
        let message = self.room.request_list();
        self.outbound.send(&message)?;
        Ok(())
    }

    /// Leave any room and close the link
    pub fn shutdown(&mut self) -> Result<(), SyncError> {
        if self.room.current().is_some() {
            self.leave_room()?;
        }
        self.outbound.close()?;
        Ok(())
    }

    /// Drop all session state; the next session starts from scratch
    pub fn reset(&mut self) {
        self.local_id = None;
        self.role = Role::SinglePlayer;
        self.store = GameStore::default();
        self.sync.reset();
        self.room = RoomDirectory::new();
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, StateError> {
    serde_json::to_value(value).map_err(|e| StateError::SerializationError(e.to_string()))
}

fn from_value(value: Value) -> Result<SharedState, StateError> {
    serde_json::from_value(value).map_err(|e| StateError::DeserializationError(e.to_string()))
}

/// Accept both `{version, patches}` and a bare patch list
fn decode_diff(value: Value) -> Result<Diff, StateError> {
    let diff = if value.is_array() {
        serde_json::from_value(value).map(Diff::new)
    } else {
        serde_json::from_value(value)
    };
    diff.map_err(|e| StateError::DeserializationError(e.to_string()))
}
