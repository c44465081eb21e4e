//! Tacsync: turn-based multiplayer state synchronization
//!
//! One `Coordinator` per participant decides whether it is single-player,
//! host or guest, gates local mutations on turn authority, and keeps the
//! host's live state and each guest's baseline in step over a room relay.

pub mod board;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod explode;
pub mod peer;
pub mod room;
pub mod session;
pub mod store;

pub use config::SyncConfig;
pub use coordinator::{Coordinator, Outbound};
pub use events::{Authority, CoordinatorEvent, EventBus, MutationEvent, Origin, Role, TaggedEvent};
pub use room::RoomDirectory;
pub use session::{LocalIntent, Session};
pub use store::{GameStore, MutationError};

use tacsync_network::{NetworkError, ProtocolError};
use tacsync_state::StateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Not your turn: {player:?} acted during {turn:?}'s turn")]
    NotYourTurn { player: String, turn: String },

    #[error("Mutation rejected: {0}")]
    Mutation(#[from] MutationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
