//! Reconnecting transport adapter
//!
//! `TransportAdapter::connect` performs the `connect` handshake and then hands
//! the channel to a background task. The task writes outbound envelopes in
//! order, forwards inbound ones as events and, when the channel drops, queues
//! outbound traffic until a reconnect succeeds. The queue is flushed before
//! anything sent after the reconnect.

use crate::protocol::{kinds, ConnectAck, ConnectRequest, Envelope, MessageStats, OutboundMessage};
use crate::transport::{Channel, Connector, TransportConfig};
use crate::NetworkError;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Events surfaced by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Envelope(Envelope),
    /// The channel dropped; the transport is reconnecting
    ConnectionLost { reason: String },
    /// Handshake completed again after a drop
    Reconnected { network_id: String },
    /// Terminal. No events follow.
    Disconnected { graceful: bool, reason: Option<String> },
}

enum Command {
    Send(Envelope),
    Disconnect,
}

/// Cloneable sending side of a connected transport
#[derive(Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    network_id: Arc<std::sync::RwLock<String>>,
    connected: Arc<AtomicBool>,
    stats: Arc<Mutex<MessageStats>>,
}

impl TransportHandle {
    /// Send `{type, data}`. Never blocks; queued while disconnected.
    pub fn send(&self, kind: &str, data: Value) -> Result<(), NetworkError> {
        self.send_envelope(Envelope::new(kind, data))
    }

    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), NetworkError> {
        self.cmd_tx
            .send(Command::Send(envelope))
            .map_err(|_| NetworkError::Disconnected)
    }

    pub fn send_message(&self, message: &OutboundMessage) -> Result<(), NetworkError> {
        self.send_envelope(message.to_envelope()?)
    }

    /// Close gracefully. No reconnect follows.
    pub fn disconnect(&self) -> Result<(), NetworkError> {
        self.cmd_tx
            .send(Command::Disconnect)
            .map_err(|_| NetworkError::Disconnected)
    }

    /// Id assigned by the relay on the latest handshake
    pub fn network_id(&self) -> String {
        self.network_id
            .read()
            .map(|id| id.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> MessageStats {
        self.stats.lock().await.clone()
    }
}

/// Result of a successful `TransportAdapter::connect`
pub struct ConnectedTransport {
    pub network_id: String,
    pub handle: TransportHandle,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

pub struct TransportAdapter;

impl TransportAdapter {
    /// Open a channel, announce `identity` and wait for the assigned id
    pub async fn connect<C: Connector>(
        connector: C,
        identity: &str,
        endpoint: &str,
        config: TransportConfig,
    ) -> Result<ConnectedTransport, NetworkError> {
        let stats = Arc::new(Mutex::new(MessageStats::default()));
        let (channel, network_id, early) =
            open_and_handshake(&connector, endpoint, identity, &config, &stats).await?;
        info!("Connected to {} as {}", endpoint, network_id);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let shared_id = Arc::new(std::sync::RwLock::new(network_id.clone()));

        for envelope in early {
            let _ = event_tx.send(TransportEvent::Envelope(envelope));
        }

        let task = TransportTask {
            connector,
            endpoint: endpoint.to_string(),
            identity: identity.to_string(),
            config,
            queue: VecDeque::new(),
            cmd_rx,
            event_tx,
            network_id: shared_id.clone(),
            connected: connected.clone(),
            stats: stats.clone(),
        };
        tokio::spawn(task.run(channel));

        Ok(ConnectedTransport {
            network_id,
            handle: TransportHandle {
                cmd_tx,
                network_id: shared_id,
                connected,
                stats,
            },
            events,
        })
    }
}

/// Opens a channel and completes the `connect` exchange. Envelopes that arrive
/// ahead of the acknowledgement are returned so they can be delivered later.
async fn open_and_handshake<C: Connector>(
    connector: &C,
    endpoint: &str,
    identity: &str,
    config: &TransportConfig,
    stats: &Arc<Mutex<MessageStats>>,
) -> Result<(Box<dyn Channel>, String, Vec<Envelope>), NetworkError> {
    let mut channel = connector.open(endpoint).await?;

    let hello = Envelope::encode(
        kinds::CONNECT,
        &ConnectRequest {
            name: identity.to_string(),
        },
    )?;
    write(channel.as_mut(), &hello, stats).await?;

    let mut early = Vec::new();
    let handshake = async {
        loop {
            match channel.recv().await {
                Some(Ok(text)) => match Envelope::from_text(&text) {
                    Ok(envelope) if envelope.kind == kinds::CONNECT => {
                        return envelope
                            .decode::<ConnectAck>()
                            .map(|ack| ack.id)
                            .map_err(NetworkError::from);
                    }
                    Ok(envelope) => {
                        debug!("Holding {} until the connect ack", envelope.kind);
                        early.push(envelope);
                    }
                    Err(e) => warn!("Dropping frame during handshake: {}", e),
                },
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(NetworkError::ConnectionFailed(
                        "channel closed during handshake".to_string(),
                    ))
                }
            }
        }
    };
    let network_id = tokio::time::timeout(config.ack_timeout, handshake)
        .await
        .map_err(|_| NetworkError::Timeout)??;

    Ok((channel, network_id, early))
}

async fn write(
    channel: &mut dyn Channel,
    envelope: &Envelope,
    stats: &Arc<Mutex<MessageStats>>,
) -> Result<(), NetworkError> {
    let text = envelope.to_text()?;
    let len = text.len() as u64;
    channel.send(text).await?;

    let mut stats = stats.lock().await;
    stats.messages_sent += 1;
    stats.bytes_sent += len;
    Ok(())
}

enum Reconnect {
    Connected(Box<dyn Channel>),
    Closed,
    Exhausted(String),
}

struct TransportTask<C> {
    connector: C,
    endpoint: String,
    identity: String,
    config: TransportConfig,
    queue: VecDeque<Envelope>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    network_id: Arc<std::sync::RwLock<String>>,
    connected: Arc<AtomicBool>,
    stats: Arc<Mutex<MessageStats>>,
}

impl<C: Connector> TransportTask<C> {
    async fn run(mut self, mut channel: Box<dyn Channel>) {
        loop {
            let reason = tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(envelope)) => {
                        match write(channel.as_mut(), &envelope, &self.stats).await {
                            Ok(()) => continue,
                            Err(e) => {
                                self.enqueue(envelope).await;
                                e.to_string()
                            }
                        }
                    }
                    Some(Command::Disconnect) | None => {
                        if let Err(e) = channel.close().await {
                            debug!("Close failed: {}", e);
                        }
                        self.finish(true, None);
                        return;
                    }
                },
                incoming = channel.recv() => match incoming {
                    Some(Ok(text)) => {
                        self.dispatch(&text).await;
                        continue;
                    }
                    Some(Err(e)) => e.to_string(),
                    None => "closed by peer".to_string(),
                },
            };

            self.connected.store(false, Ordering::Release);
            warn!("Connection lost: {}", reason);
            self.emit(TransportEvent::ConnectionLost { reason });

            match self.reconnect().await {
                Reconnect::Connected(next) => channel = next,
                Reconnect::Closed => {
                    self.finish(true, None);
                    return;
                }
                Reconnect::Exhausted(reason) => {
                    warn!("Giving up on {}: {}", self.endpoint, reason);
                    self.finish(false, Some(reason));
                    return;
                }
            }
        }
    }

    async fn reconnect(&mut self) -> Reconnect {
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.config.max_reconnect_attempts {
            let sleep = tokio::time::sleep(self.config.backoff(attempt));
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(Command::Send(envelope)) => self.enqueue(envelope).await,
                        Some(Command::Disconnect) | None => return Reconnect::Closed,
                    },
                }
            }

            info!(
                "Reconnect attempt {}/{} to {}",
                attempt, self.config.max_reconnect_attempts, self.endpoint
            );
            let opened = open_and_handshake(
                &self.connector,
                &self.endpoint,
                &self.identity,
                &self.config,
                &self.stats,
            )
            .await;

            match opened {
                Ok((mut channel, network_id, early)) => {
                    if let Err(e) = self.flush(channel.as_mut()).await {
                        warn!("Flush after reconnect failed: {}", e);
                        last_error = e.to_string();
                        continue;
                    }

                    if let Ok(mut id) = self.network_id.write() {
                        *id = network_id.clone();
                    }
                    self.connected.store(true, Ordering::Release);
                    self.stats.lock().await.reconnects += 1;
                    info!("Reconnected as {}", network_id);
                    self.emit(TransportEvent::Reconnected { network_id });
                    for envelope in early {
                        self.emit(TransportEvent::Envelope(envelope));
                    }
                    return Reconnect::Connected(channel);
                }
                Err(e) => {
                    debug!("Reconnect attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                }
            }
        }

        Reconnect::Exhausted(last_error)
    }

    /// Drain the offline queue in order; unsent entries stay queued on error
    async fn flush(&mut self, channel: &mut dyn Channel) -> Result<(), NetworkError> {
        while let Some(envelope) = self.queue.front() {
            write(channel, envelope, &self.stats).await?;
            self.queue.pop_front();
        }
        Ok(())
    }

    async fn enqueue(&mut self, envelope: Envelope) {
        debug!("Queueing {} while disconnected", envelope.kind);
        self.queue.push_back(envelope);
        if self.queue.len() == self.config.queue_warn_len {
            warn!("Offline queue holds {} envelopes", self.queue.len());
        }
        self.stats.lock().await.messages_queued += 1;
    }

    async fn dispatch(&mut self, text: &str) {
        let mut stats = self.stats.lock().await;
        match Envelope::from_text(text) {
            Ok(envelope) => {
                stats.messages_received += 1;
                stats.bytes_received += text.len() as u64;
                drop(stats);
                self.emit(TransportEvent::Envelope(envelope));
            }
            Err(e) => {
                stats.dropped_frames += 1;
                warn!("Dropping undecodable frame: {}", e);
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Transport event receiver dropped");
        }
    }

    fn finish(&self, graceful: bool, reason: Option<String>) {
        self.connected.store(false, Ordering::Release);
        if !self.queue.is_empty() {
            warn!("Discarding {} queued envelopes", self.queue.len());
        }
        self.emit(TransportEvent::Disconnected { graceful, reason });
    }
}
