//! Scripted in-process channels for adapter tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tacsync_network::{Channel, Connector, Envelope, NetworkError, TransportEvent};
use tokio::sync::mpsc;

/// Behaviour of one opened channel
#[derive(Clone, Default)]
pub struct Script {
    inbound: VecDeque<String>,
    fail_after: Option<usize>,
    hang_up: bool,
}

impl Script {
    /// Acknowledges the handshake with `id`
    pub fn accept(id: &str) -> Self {
        let ack = json!({"type": "connect", "data": {"id": id}}).to_string();
        Self {
            inbound: VecDeque::from([ack]),
            ..Default::default()
        }
    }

    /// Never acknowledges
    pub fn silent() -> Self {
        Self::default()
    }

    /// Delivered before the acknowledgement
    pub fn preceded_by(mut self, text: &str) -> Self {
        self.inbound.push_front(text.to_string());
        self
    }

    /// Delivered after the acknowledgement
    pub fn then(mut self, text: &str) -> Self {
        self.inbound.push_back(text.to_string());
        self
    }

    /// Sends beyond the first `n` fail
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// The peer closes once scripted inbound frames are exhausted
    pub fn hang_up(mut self) -> Self {
        self.hang_up = true;
        self
    }
}

type SentLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Default)]
pub struct MockConnector {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    logs: Arc<Mutex<Vec<SentLog>>>,
    opened: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            ..Default::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Envelopes written to the `index`th opened channel
    pub fn sent(&self, index: usize) -> Vec<Envelope> {
        let logs = self.logs.lock().unwrap();
        logs.get(index)
            .map(|log| {
                log.lock()
                    .unwrap()
                    .iter()
                    .map(|text| Envelope::from_text(text).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _endpoint: &str) -> Result<Box<dyn Channel>, NetworkError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NetworkError::ConnectionFailed("refused".to_string()))?;

        let sent = SentLog::default();
        self.logs.lock().unwrap().push(sent.clone());
        Ok(Box::new(MockChannel { script, sent }))
    }
}

struct MockChannel {
    script: Script,
    sent: SentLog,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, text: String) -> Result<(), NetworkError> {
        let mut sent = self.sent.lock().unwrap();
        if self.script.fail_after.is_some_and(|n| sent.len() >= n) {
            return Err(NetworkError::TransportError("connection reset".to_string()));
        }
        sent.push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, NetworkError>> {
        if let Some(text) = self.script.inbound.pop_front() {
            return Some(Ok(text));
        }
        if self.script.hang_up {
            return None;
        }
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), NetworkError> {
        Ok(())
    }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event stream closed")
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
