//! Two sessions playing through an in-memory relay

use std::time::Duration;
use tacsync::{
    Coordinator, CoordinatorEvent, LocalIntent, MutationEvent, Origin, Role, Session, SyncConfig,
    TaggedEvent,
};
use tacsync_network::{RoomStatus, TransportConfig, TransportHandle};
use tacsync_state::Position;
use tacsync_test_utils::{init_test_logging, wait_for_event, MemoryRelay};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

struct Peer {
    intents: mpsc::Sender<LocalIntent>,
    events: broadcast::Receiver<CoordinatorEvent>,
    task: JoinHandle<Coordinator<TransportHandle>>,
}

impl Peer {
    async fn connect(relay: &MemoryRelay, name: &str) -> Self {
        let config = SyncConfig {
            display_name: name.to_string(),
            sync_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let transport = TransportConfig {
            reconnect_base_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let (intents, rx) = mpsc::channel(16);
        let session = Session::connect(relay.clone(), "memory://relay", config, transport, rx)
            .await
            .expect("connect to relay");
        let events = session.subscribe();
        let task = tokio::spawn(session.run());
        Self {
            intents,
            events,
            task,
        }
    }

    async fn send(&self, intent: LocalIntent) {
        self.intents.send(intent).await.expect("session running");
    }

    async fn wait<F>(&mut self, matches: F) -> CoordinatorEvent
    where
        F: FnMut(&CoordinatorEvent) -> bool,
    {
        wait_for_event(&mut self.events, WAIT, matches)
            .await
            .expect("coordinator event")
    }

    async fn quit(self) -> Coordinator<TransportHandle> {
        self.send(LocalIntent::Quit).await;
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("session stops")
            .expect("session task")
    }
}

fn move_to(name: &str, x: i32, y: i32) -> MutationEvent {
    MutationEvent::CharacterPosition {
        name: name.to_string(),
        position: Position::new(x, y),
    }
}

fn is_network(event: &CoordinatorEvent, expected: &MutationEvent) -> bool {
    matches!(
        event,
        CoordinatorEvent::Mutation(TaggedEvent {
            event,
            origin: Origin::Network { .. },
        }) if event == expected
    )
}

/// Host creates a room, guest joins, both ready up and the guest receives the board
async fn start_game(relay: &MemoryRelay) -> (Peer, Peer) {
    let mut host = Peer::connect(relay, "Alice").await;
    let mut guest = Peer::connect(relay, "Bob").await;

    host.send(LocalIntent::CreateRoom {
        name: "Ops".to_string(),
        capacity: 2,
    })
    .await;
    host.wait(|e| *e == CoordinatorEvent::RoleChanged(Role::Host))
        .await;

    let room_id = relay.rooms()[0].id.clone();
    guest.send(LocalIntent::JoinRoom(room_id)).await;
    guest
        .wait(|e| *e == CoordinatorEvent::RoleChanged(Role::Guest))
        .await;

    host.send(LocalIntent::SetReady(true)).await;
    guest.send(LocalIntent::SetReady(true)).await;
    // Board generated by the host after the relay starts the game
    guest.wait(|e| *e == CoordinatorEvent::FullResync).await;

    (host, guest)
}

#[tokio::test]
async fn test_moves_and_turns_flow_both_ways() {
    init_test_logging();
    let relay = MemoryRelay::new();
    let (mut host, mut guest) = start_game(&relay).await;
    assert_eq!(relay.rooms()[0].status, RoomStatus::Playing);

    host.send(LocalIntent::Mutation(move_to("alice", 21, 25)))
        .await;
    guest
        .wait(|e| is_network(e, &move_to("alice", 21, 25)))
        .await;

    host.send(LocalIntent::EndTurn).await;
    let turn = MutationEvent::TurnChanged {
        player: "p2".to_string(),
    };
    guest.wait(|e| is_network(e, &turn)).await;

    guest
        .send(LocalIntent::Mutation(move_to("bob", 26, 25)))
        .await;
    host.wait(|e| is_network(e, &move_to("bob", 26, 25))).await;
    // The host's next diff carries the move back to the guest's baseline
    guest
        .wait(|e| is_network(e, &move_to("bob", 26, 25)))
        .await;

    let host = host.quit().await;
    let guest = guest.quit().await;

    for state in [host.state(), guest.state()] {
        assert_eq!(state.game.turn, "p2");
        assert_eq!(
            state.character("alice").unwrap().position,
            Position::new(21, 25)
        );
        assert_eq!(
            state.character("bob").unwrap().position,
            Position::new(26, 25)
        );
    }
}

#[tokio::test]
async fn test_guest_out_of_turn_move_is_rejected() {
    init_test_logging();
    let relay = MemoryRelay::new();
    let (mut host, mut guest) = start_game(&relay).await;

    guest
        .send(LocalIntent::Mutation(move_to("bob", 26, 25)))
        .await;
    let rejected = guest
        .wait(|e| matches!(e, CoordinatorEvent::IntentRejected { .. }))
        .await;
    let CoordinatorEvent::IntentRejected { reason } = rejected else {
        unreachable!();
    };
    assert!(reason.contains("Not your turn"), "{reason}");

    host.send(LocalIntent::Mutation(move_to("alice", 21, 25)))
        .await;
    host.wait(|e| matches!(e, CoordinatorEvent::Mutation(_))).await;

    let host = host.quit().await;
    assert_eq!(
        host.state().character("bob").unwrap().position,
        Position::new(25, 25)
    );
    guest.quit().await;
}

#[tokio::test]
async fn test_joining_unknown_room_reports_relay_error() {
    init_test_logging();
    let relay = MemoryRelay::new();
    let mut peer = Peer::connect(&relay, "Carol").await;

    peer.send(LocalIntent::JoinRoom("nowhere".to_string())).await;
    let error = peer
        .wait(|e| matches!(e, CoordinatorEvent::RemoteError { .. }))
        .await;
    assert!(matches!(
        error,
        CoordinatorEvent::RemoteError {
            code: tacsync_network::ErrorCode::RoomNotFound,
            ..
        }
    ));

    let coordinator = peer.quit().await;
    assert_eq!(coordinator.role(), Role::SinglePlayer);
}

#[tokio::test]
async fn test_severed_guest_reconnects_under_new_id() {
    init_test_logging();
    let relay = MemoryRelay::new();
    let (host, mut guest) = start_game(&relay).await;

    relay.sever("p2");
    guest
        .wait(|e| matches!(e, CoordinatorEvent::ConnectionLost { .. }))
        .await;
    let reconnected = guest
        .wait(|e| matches!(e, CoordinatorEvent::Reconnected { .. }))
        .await;
    assert_eq!(
        reconnected,
        CoordinatorEvent::Reconnected {
            network_id: "p3".to_string()
        }
    );

    assert!(relay.client_ids().contains(&"p3".to_string()));

    let guest = guest.quit().await;
    assert_eq!(guest.local_id(), Some("p3"));
    host.quit().await;
}
