//! State synchronization for Tacsync
//!
//! Holds the replicated game snapshot, the structural diff engine used to ship
//! incremental updates, and the baseline bookkeeping shared by host and guests.

pub mod diff;
pub mod snapshot;
pub mod sync;

pub use diff::{filter_ui_patches, Diff, DiffEngine, Patch, PatchOp, PathSegment};
pub use snapshot::{
    Animation, Cell, Character, GameInfo, Item, LogEntry, LogKind, MapGrid, OverwatchTrigger,
    PlayerId, PlayerMeta, Pool, Popup, Position, Projectile, SharedState, Terrain, UiState,
};
pub use sync::{StateSynchronizer, StateUpdate};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The diff does not fit the baseline it was applied to
    #[error("Malformed diff at patch {index}: {reason}")]
    MalformedDiff { index: usize, reason: String },

    #[error("No baseline to apply the diff to")]
    NoBaseline,
}
