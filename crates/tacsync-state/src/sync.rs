//! State synchronization protocol implementation
//!
//! Tracks the baseline snapshot used for diffing (host) or reconciliation
//! (guest), together with the diff sequence numbers.

use crate::{
    diff::{Diff, DiffEngine},
    snapshot::SharedState,
    StateError,
};
use tracing::debug;

/// Update produced by the host for the current snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Complete snapshot, sent when no baseline exists yet
    FullState { seq: u64, state: SharedState },

    /// Incremental update relative to the previous baseline
    Delta { seq: u64, diff: Diff },
}

impl StateUpdate {
    pub fn seq(&self) -> u64 {
        match self {
            StateUpdate::FullState { seq, .. } | StateUpdate::Delta { seq, .. } => *seq,
        }
    }
}

/// Manages the sync baseline for one session
pub struct StateSynchronizer {
    engine: DiffEngine,

    /// Last snapshot sent (host) or reconciled (guest)
    baseline: Option<SharedState>,

    /// Sequence number of the last produced update
    current_seq: u64,

    /// Sequence number of the last applied delta
    last_applied: Option<u64>,

    /// Strip the presentation sub-tree from outgoing updates
    filter_ui: bool,
}

impl Default for StateSynchronizer {
    fn default() -> Self {
        Self::new(DiffEngine::default(), true)
    }
}

impl StateSynchronizer {
    /// Create a new state synchronizer without a baseline
    pub fn new(engine: DiffEngine, filter_ui: bool) -> Self {
        Self {
            engine,
            baseline: None,
            current_seq: 0,
            last_applied: None,
            filter_ui,
        }
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    /// Host side: produce the update for `current`
    ///
    /// Returns a full snapshot when there is no baseline, a delta when
    /// something authoritative changed, and `None` otherwise. The baseline
    /// always advances to `current`.
    pub fn update_state(
        &mut self,
        current: &SharedState,
    ) -> Result<Option<StateUpdate>, StateError> {
        let snapshot = if self.filter_ui {
            current.without_ui()
        } else {
            current.clone()
        };

        let Some(baseline) = self.baseline.as_ref() else {
            self.current_seq += 1;
            self.baseline = Some(snapshot.clone());
            debug!("Producing full state seq={}", self.current_seq);
            return Ok(Some(StateUpdate::FullState {
                seq: self.current_seq,
                state: snapshot,
            }));
        };

        let mut diff = self.engine.compute(baseline, &snapshot)?;
        if self.filter_ui {
            diff = diff.without_ui();
        }
        self.baseline = Some(snapshot);

        if diff.is_empty() {
            return Ok(None);
        }

        self.current_seq += 1;
        debug!(
            "Producing delta seq={} with {} patches",
            self.current_seq,
            diff.len()
        );
        Ok(Some(StateUpdate::Delta {
            seq: self.current_seq,
            diff: diff.with_version(self.current_seq),
        }))
    }

    /// Guest side: replace the baseline wholesale
    pub fn apply_sync(&mut self, state: SharedState) {
        self.baseline = Some(state);
        self.last_applied = None;
    }

    /// Guest side: patch the baseline
    ///
    /// Returns the previous baseline on success, or `None` when the delta was
    /// already applied. A malformed delta, or one whose result fails
    /// `SharedState::validate`, discards the baseline so the next full sync
    /// starts clean.
    pub fn apply_update(&mut self, diff: &Diff) -> Result<Option<SharedState>, StateError> {
        let Some(baseline) = self.baseline.as_ref() else {
            return Err(StateError::NoBaseline);
        };

        if let Some(last) = self.last_applied {
            if diff.version != 0 && diff.version <= last {
                debug!("Ignoring duplicate delta {}", diff.version);
                return Ok(None);
            }
        }

        match self
            .engine
            .apply(baseline, diff)
            .and_then(|next| next.validate().map(|()| next))
        {
            Ok(next) => {
                self.last_applied = Some(diff.version);
                Ok(self.baseline.replace(next))
            }
            Err(e) => {
                self.baseline = None;
                self.last_applied = None;
                Err(e)
            }
        }
    }

    /// Forget the baseline; the next host update is a full snapshot
    pub fn reset(&mut self) {
        self.baseline = None;
        self.last_applied = None;
    }

    pub fn baseline(&self) -> Option<&SharedState> {
        self.baseline.as_ref()
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Get current sequence number
    pub fn current_seq(&self) -> u64 {
        self.current_seq
    }
}
