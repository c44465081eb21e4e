//! Mutation-event vocabulary and the coordinator event bus
//!
//! A `MutationEvent` serializes as `{type, data}`, the same shape a
//! `playerAction` carries, so local intents and network re-dispatches share
//! one decoder.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tacsync_network::{ActionEnvelope, ErrorCode};
use tacsync_state::{
    Animation, Character, LogEntry, OverwatchTrigger, PlayerId, Pool, Position, Projectile,
};
use tokio::sync::broadcast;
use tracing::trace;

/// Every change the game may make to the shared state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum MutationEvent {
    TurnChanged {
        player: PlayerId,
    },
    CharacterPosition {
        name: String,
        position: Position,
    },
    CharacterPath {
        name: String,
        path: Vec<Position>,
    },
    ActionPointsSpent {
        name: String,
        amount: u32,
    },
    #[serde(rename_all = "camelCase")]
    ActionPointsChanged {
        name: String,
        action_points: Pool,
    },
    CharacterDamaged {
        name: String,
        amount: u32,
        #[serde(default)]
        attacker: Option<String>,
    },
    HealthChanged {
        name: String,
        health: Pool,
    },
    CharacterAdded {
        character: Character,
    },
    CharacterRemoved {
        name: String,
    },
    MessageLogged {
        entry: LogEntry,
    },
    OverwatchChanged {
        name: String,
        #[serde(default)]
        trigger: Option<OverwatchTrigger>,
    },
    AnimationChanged {
        name: String,
        #[serde(default)]
        animation: Option<Animation>,
    },
    ProjectileAdded {
        projectile: Projectile,
    },
    ProjectileRemoved {
        id: String,
    },
    /// Movement preview; never leaves the local peer
    HighlightsChanged {
        cells: Vec<Position>,
    },
}

/// Who may originate an event locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority<'a> {
    /// Anyone, at any time
    Anyone,
    /// Only the player whose turn it is
    TurnHolder,
    /// The turn holder, and only for a character they own
    Character(&'a str),
}

impl MutationEvent {
    /// Wire name, as used for the `playerAction` action type
    pub fn kind(&self) -> &'static str {
        match self {
            MutationEvent::TurnChanged { .. } => "turnChanged",
            MutationEvent::CharacterPosition { .. } => "characterPosition",
            MutationEvent::CharacterPath { .. } => "characterPath",
            MutationEvent::ActionPointsSpent { .. } => "actionPointsSpent",
            MutationEvent::ActionPointsChanged { .. } => "actionPointsChanged",
            MutationEvent::CharacterDamaged { .. } => "characterDamaged",
            MutationEvent::HealthChanged { .. } => "healthChanged",
            MutationEvent::CharacterAdded { .. } => "characterAdded",
            MutationEvent::CharacterRemoved { .. } => "characterRemoved",
            MutationEvent::MessageLogged { .. } => "messageLogged",
            MutationEvent::OverwatchChanged { .. } => "overwatchChanged",
            MutationEvent::AnimationChanged { .. } => "animationChanged",
            MutationEvent::ProjectileAdded { .. } => "projectileAdded",
            MutationEvent::ProjectileRemoved { .. } => "projectileRemoved",
            MutationEvent::HighlightsChanged { .. } => "highlightsChanged",
        }
    }

    /// Whether a locally originated instance is relayed to the room
    pub fn is_broadcast(&self) -> bool {
        !matches!(self, MutationEvent::HighlightsChanged { .. })
    }

    pub fn authority(&self) -> Authority<'_> {
        match self {
            MutationEvent::CharacterPosition { name, .. }
            | MutationEvent::CharacterPath { name, .. }
            | MutationEvent::ActionPointsSpent { name, .. }
            | MutationEvent::ActionPointsChanged { name, .. }
            | MutationEvent::OverwatchChanged { name, .. } => Authority::Character(name),
            MutationEvent::TurnChanged { .. }
            | MutationEvent::CharacterDamaged { .. }
            | MutationEvent::HealthChanged { .. }
            | MutationEvent::CharacterAdded { .. }
            | MutationEvent::CharacterRemoved { .. } => Authority::TurnHolder,
            MutationEvent::MessageLogged { .. }
            | MutationEvent::AnimationChanged { .. }
            | MutationEvent::ProjectileAdded { .. }
            | MutationEvent::ProjectileRemoved { .. }
            | MutationEvent::HighlightsChanged { .. } => Authority::Anyone,
        }
    }

    /// Encode as a `playerAction` action stamped with `sender`
    pub fn to_action(&self, sender: &str) -> Result<ActionEnvelope, serde_json::Error> {
        let mut action: ActionEnvelope = serde_json::from_value(serde_json::to_value(self)?)?;
        match &mut action.data {
            Value::Object(fields) => {
                fields.insert("senderId".to_string(), Value::String(sender.to_string()));
            }
            other => {
                let mut fields = serde_json::Map::new();
                fields.insert("senderId".to_string(), Value::String(sender.to_string()));
                if !other.is_null() {
                    fields.insert("value".to_string(), other.take());
                }
                *other = Value::Object(fields);
            }
        }
        Ok(action)
    }

    /// Decode a relayed action; the `senderId` stamp is ignored
    pub fn from_action(action: &ActionEnvelope) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "type": action.kind,
            "data": action.data,
        }))
    }
}

/// Where an event came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local,
    /// Replayed from a remote diff or action; `player` is the relay stamp
    Network { player: Option<PlayerId> },
}

impl Origin {
    pub fn from_network(&self) -> bool {
        matches!(self, Origin::Network { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub event: MutationEvent,
    pub origin: Origin,
}

impl TaggedEvent {
    pub fn local(event: MutationEvent) -> Self {
        Self {
            event,
            origin: Origin::Local,
        }
    }

    pub fn network(event: MutationEvent, player: Option<PlayerId>) -> Self {
        Self {
            event,
            origin: Origin::Network { player },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    SinglePlayer,
    Host,
    Guest,
}

/// What subscribers (rendering, logs) observe
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A mutation was applied to the live state
    Mutation(TaggedEvent),
    /// The live state was replaced and should be redrawn from scratch
    FullResync,
    RoleChanged(Role),
    /// Room membership or listing changed
    RoomChanged,
    RemoteError { code: ErrorCode, message: String },
    /// A local intent was refused
    IntentRejected { reason: String },
    ConnectionLost { reason: String },
    Reconnected { network_id: String },
    /// The transport is gone for good
    Disconnected,
}

/// Broadcast fan-out of coordinator events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: CoordinatorEvent) {
        if self.tx.send(event).is_err() {
            trace!("No coordinator event subscribers");
        }
    }
}
