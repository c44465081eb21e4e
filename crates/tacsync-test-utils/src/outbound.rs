use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tacsync::Outbound;
use tacsync_network::{ActionEnvelope, Envelope, NetworkError, OutboundMessage};

/// Outbound sink that records everything a coordinator sends
#[derive(Clone, Default)]
pub struct RecordingOutbound {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Drain the recording
    pub fn take(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(OutboundMessage::kind).collect()
    }

    pub fn player_actions(&self) -> Vec<ActionEnvelope> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::PlayerAction(req) => Some(req.action),
                _ => None,
            })
            .collect()
    }

    /// Recorded messages as wire envelopes, for feeding another coordinator
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.sent()
            .iter()
            .filter_map(|m| m.to_envelope().ok())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Outbound for RecordingOutbound {
    fn send(&self, message: &OutboundMessage) -> Result<(), NetworkError> {
        self.sent
            .lock()
            .map_err(|_| NetworkError::Disconnected)?
            .push(message.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), NetworkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
