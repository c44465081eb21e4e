//! Session configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Name announced to the relay on connect
    pub display_name: String,
    /// Host snapshot cadence
    pub sync_interval: Duration,
    /// Keep the `ui` sub-tree out of outgoing diffs
    pub filter_ui: bool,
    /// Capacity of the coordinator event bus
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            display_name: "Player".to_string(),
            sync_interval: Duration::from_millis(100),
            filter_ui: true,
            event_capacity: 256,
        }
    }
}
