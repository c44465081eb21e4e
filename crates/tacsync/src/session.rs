//! Session driver: one task per participant
//!
//! Multiplexes transport events, the host sync tick and local intents. Each
//! branch runs its handler to completion before the next is polled.

use crate::config::SyncConfig;
use crate::coordinator::{Coordinator, Outbound};
use crate::events::{CoordinatorEvent, MutationEvent};
use crate::SyncError;
use tacsync_network::{Connector, TransportAdapter, TransportConfig, TransportEvent, TransportHandle};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Requests from the local player or game logic
#[derive(Debug, Clone, PartialEq)]
pub enum LocalIntent {
    Mutation(MutationEvent),
    EndTurn,
    CreateRoom { name: String, capacity: u8 },
    JoinRoom(String),
    LeaveRoom,
    SetReady(bool),
    RequestRoomList,
    Quit,
}

pub struct Session<O> {
    coordinator: Coordinator<O>,
    transport: mpsc::UnboundedReceiver<TransportEvent>,
    intents: mpsc::Receiver<LocalIntent>,
}

impl Session<TransportHandle> {
    /// Connect to the relay under `config.display_name`
    pub async fn connect<C: Connector>(
        connector: C,
        endpoint: &str,
        config: SyncConfig,
        transport_config: TransportConfig,
        intents: mpsc::Receiver<LocalIntent>,
    ) -> Result<Self, SyncError> {
        let connected = TransportAdapter::connect(
            connector,
            &config.display_name,
            endpoint,
            transport_config,
        )
        .await?;

        let mut coordinator = Coordinator::new(config, connected.handle);
        coordinator.set_local_id(connected.network_id);
        Ok(Self::new(coordinator, connected.events, intents))
    }
}

impl<O: Outbound> Session<O> {
    pub fn new(
        coordinator: Coordinator<O>,
        transport: mpsc::UnboundedReceiver<TransportEvent>,
        intents: mpsc::Receiver<LocalIntent>,
    ) -> Self {
        Self {
            coordinator,
            transport,
            intents,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<O> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut Coordinator<O> {
        &mut self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.coordinator.subscribe()
    }

    /// Drive the session until the transport ends or the player quits
    pub async fn run(mut self) -> Coordinator<O> {
        let mut ticker = tokio::time::interval(self.coordinator.config().sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.transport.recv() => {
                    let Some(event) = event else {
                        info!("Transport event stream ended");
                        break;
                    };
                    let terminal = matches!(event, TransportEvent::Disconnected { .. });
                    if let Err(e) = self.coordinator.handle_transport_event(event) {
                        warn!("Inbound handling failed: {}", e);
                    }
                    if terminal {
                        break;
                    }
                }
                _ = ticker.tick(), if self.coordinator.is_syncing() => {
                    if let Err(e) = self.coordinator.tick() {
                        warn!("Sync tick failed: {}", e);
                    }
                }
                intent = self.intents.recv() => match intent {
                    Some(LocalIntent::Quit) | None => {
                        debug!("Local side quit");
                        if let Err(e) = self.coordinator.shutdown() {
                            warn!("Shutdown failed: {}", e);
                        }
                        break;
                    }
                    Some(intent) => self.apply_intent(intent),
                },
            }
        }

        self.coordinator
    }

    fn apply_intent(&mut self, intent: LocalIntent) {
        let coordinator = &mut self.coordinator;
        let result = match intent.clone() {
            LocalIntent::Mutation(event) => coordinator.submit_local(event),
            LocalIntent::EndTurn => coordinator.end_turn(),
            LocalIntent::CreateRoom { name, capacity } => coordinator.create_room(&name, capacity),
            LocalIntent::JoinRoom(id) => coordinator.join_room(&id),
            LocalIntent::LeaveRoom => coordinator.leave_room(),
            LocalIntent::SetReady(ready) => coordinator.set_ready(ready),
            LocalIntent::RequestRoomList => coordinator.request_room_list(),
            LocalIntent::Quit => Ok(()),
        };

        if let Err(e) = result {
            warn!("Rejected {:?}: {}", intent, e);
            coordinator.publish(CoordinatorEvent::IntentRejected {
                reason: e.to_string(),
            });
        }
    }
}
