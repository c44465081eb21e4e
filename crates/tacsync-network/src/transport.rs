//! Channel abstraction under the transport adapter
//!
//! A `Connector` opens text channels to an endpoint; the adapter owns one
//! channel at a time and replaces it on reconnect.

use crate::NetworkError;
use async_trait::async_trait;
use std::time::Duration;

/// Configuration for the transport layer
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long to wait for the relay's `connect` acknowledgement
    pub ack_timeout: Duration,
    /// Reconnect attempts before the transport reports a terminal disconnect
    pub max_reconnect_attempts: u32,
    /// Attempt `n` waits `n * reconnect_base_delay`
    pub reconnect_base_delay: Duration,
    /// Log a warning once the offline queue reaches this many envelopes
    pub queue_warn_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            queue_warn_len: 256,
        }
    }
}

impl TransportConfig {
    /// Wait before reconnect attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reconnect_base_delay.saturating_mul(attempt)
    }
}

/// A bidirectional text channel
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, text: String) -> Result<(), NetworkError>;

    /// Next inbound text frame; `None` once the peer has closed.
    /// Must be cancel safe.
    async fn recv(&mut self) -> Option<Result<String, NetworkError>>;

    async fn close(&mut self) -> Result<(), NetworkError>;
}

/// Opens channels to a relay endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Channel>, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_linear() {
        let config = TransportConfig {
            reconnect_base_delay: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(250));
        assert_eq!(config.backoff(4), Duration::from_secs(1));
    }
}
