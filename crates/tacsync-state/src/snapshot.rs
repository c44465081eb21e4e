//! Shared game state that is replicated between session participants
//!
//! Field names serialize in camelCase so the wire format matches the relay's
//! other clients.

use crate::StateError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Participant identifier (the network identity assigned by the relay)
pub type PlayerId = String;

/// Root of the replicated state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    pub game: GameInfo,
    pub characters: Vec<Character>,
    pub map: MapGrid,
    #[serde(default)]
    pub messages: Vec<LogEntry>,
    /// Presentation-only sub-tree, never part of the authoritative stream
    #[serde(default)]
    pub ui: UiState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwatch: Option<BTreeMap<String, OverwatchTrigger>>,
}

/// Turn bookkeeping and participant metadata
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub turn: PlayerId,
    pub players: Vec<PlayerId>,
    #[serde(default)]
    pub player_info: BTreeMap<PlayerId, PlayerMeta>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMeta {
    pub name: String,
    #[serde(default)]
    pub is_ai: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A bounded counter such as hit points or action points
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pool {
    pub current: u32,
    pub max: u32,
}

impl Pool {
    pub fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Subtract `amount`, saturating at zero
    pub fn drain(&mut self, amount: u32) {
        self.current = self.current.saturating_sub(amount);
    }

    pub fn refill(&mut self) {
        self.current = self.max;
    }

    pub fn is_empty(&self) -> bool {
        self.current == 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub damage: u32,
    #[serde(default)]
    pub range: u32,
}

/// A character on the board; `name` is its identity for the whole session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub owner: PlayerId,
    pub position: Position,
    pub health: Pool,
    pub action_points: Pool,
    #[serde(default)]
    pub equipment: Vec<Item>,
    /// Planned movement path, rendered before the move is committed
    #[serde(default)]
    pub path: Vec<Position>,
}

impl Character {
    pub fn is_alive(&self) -> bool {
        !self.health.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Terrain {
    #[default]
    Floor,
    Wall,
    Water,
    Cover,
}

impl Terrain {
    pub fn is_walkable(self) -> bool {
        matches!(self, Terrain::Floor | Terrain::Cover)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub terrain: Terrain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupant: Option<String>,
}

/// Board grid, indexed `cells[y][x]`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MapGrid {
    pub width: u32,
    pub height: u32,
    pub cells: Vec<Vec<Cell>>,
}

impl MapGrid {
    /// Create a grid where every cell has the same terrain
    pub fn filled(width: u32, height: u32, terrain: Terrain) -> Self {
        let row = vec![
            Cell {
                terrain,
                occupant: None,
            };
            width as usize
        ];
        Self {
            width,
            height,
            cells: vec![row; height as usize],
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        if !self.contains(pos) {
            return None;
        }
        self.cells
            .get(pos.y as usize)
            .and_then(|row| row.get(pos.x as usize))
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        if !self.contains(pos) {
            return None;
        }
        self.cells
            .get_mut(pos.y as usize)
            .and_then(|row| row.get_mut(pos.x as usize))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum LogKind {
    #[default]
    Narrative,
    System,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LogEntry {
    pub kind: LogKind,
    pub text: String,
}

impl LogEntry {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            kind: LogKind::System,
            text: text.into(),
        }
    }

    pub fn narrative(text: impl Into<String>) -> Self {
        Self {
            kind: LogKind::Narrative,
            text: text.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    pub kind: String,
    #[serde(default)]
    pub frame: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Projectile {
    pub id: String,
    pub from: Position,
    pub to: Position,
    #[serde(default)]
    pub kind: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Popup {
    pub id: String,
    pub text: String,
    pub position: Position,
}

/// Locally derived presentation state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(default)]
    pub animations: BTreeMap<String, Animation>,
    #[serde(default)]
    pub highlights: Vec<Position>,
    #[serde(default)]
    pub projectiles: Vec<Projectile>,
    #[serde(default)]
    pub popups: Vec<Popup>,
}

/// Pending reactive fire for a character on overwatch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OverwatchTrigger {
    pub cells: Vec<Position>,
    pub remaining_shots: u32,
}

impl SharedState {
    pub fn character(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }

    pub fn character_mut(&mut self, name: &str) -> Option<&mut Character> {
        self.characters.iter_mut().find(|c| c.name == name)
    }

    pub fn is_turn_of(&self, player: &str) -> bool {
        self.game.turn == player
    }

    /// Player that follows the current turn holder, wrapping around
    pub fn next_player(&self) -> Option<&PlayerId> {
        let players = &self.game.players;
        let idx = players.iter().position(|p| *p == self.game.turn)?;
        players.get((idx + 1) % players.len())
    }

    /// Copy of this state with the presentation sub-tree cleared
    pub fn without_ui(&self) -> Self {
        Self {
            ui: UiState::default(),
            ..self.clone()
        }
    }

    /// Check the structural invariants of a snapshot
    pub fn validate(&self) -> Result<(), StateError> {
        let holders = self
            .game
            .players
            .iter()
            .filter(|p| **p == self.game.turn)
            .count();
        if holders != 1 {
            return Err(StateError::InvalidState(format!(
                "turn holder {:?} appears {} times in players",
                self.game.turn, holders
            )));
        }

        let mut names = BTreeSet::new();
        for character in &self.characters {
            if !names.insert(character.name.as_str()) {
                return Err(StateError::InvalidState(format!(
                    "duplicate character name {:?}",
                    character.name
                )));
            }
        }

        Ok(())
    }

    /// Serialize state to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        serde_json::to_vec(self).map_err(|e| StateError::SerializationError(e.to_string()))
    }

    /// Deserialize state from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        serde_json::from_slice(bytes).map_err(|e| StateError::DeserializationError(e.to_string()))
    }
}
