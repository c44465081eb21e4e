use proptest::prelude::*;
use std::collections::BTreeMap;
use tacsync_state::{Character, DiffEngine, GameInfo, LogEntry, MapGrid, Pool, Position, SharedState, Terrain};

fn arb_character(name: String) -> impl Strategy<Value = Character> {
    (0..40i32, 0..40i32, 0..10u32, 0..4u32, prop::bool::ANY).prop_map(
        move |(x, y, hp, ap, planned)| Character {
            name: name.clone(),
            owner: if x % 2 == 0 { "p1" } else { "p2" }.to_string(),
            position: Position::new(x, y),
            health: Pool { current: hp, max: 10 },
            action_points: Pool { current: ap, max: 4 },
            equipment: Vec::new(),
            path: if planned {
                vec![Position::new(x, y + 1)]
            } else {
                Vec::new()
            },
        },
    )
}

fn arb_state() -> impl Strategy<Value = SharedState> {
    let names = prop::sample::subsequence(
        vec!["alpha", "bravo", "charlie", "delta", "echo"],
        0..=5,
    );
    let characters = names.prop_flat_map(|names| {
        names
            .into_iter()
            .map(|n| arb_character(n.to_string()))
            .collect::<Vec<_>>()
    });
    let messages = prop::collection::vec("[a-z ]{0,12}", 0..4);

    (characters, messages, prop::bool::ANY, 1..6u32).prop_map(|(characters, messages, second, size)| {
        SharedState {
            game: GameInfo {
                turn: if second { "p2" } else { "p1" }.to_string(),
                players: vec!["p1".to_string(), "p2".to_string()],
                player_info: BTreeMap::new(),
            },
            characters,
            map: MapGrid::filled(size, size, Terrain::Floor),
            messages: messages.into_iter().map(LogEntry::narrative).collect(),
            ..Default::default()
        }
    })
}

proptest! {
    #[test]
    fn apply_of_compute_reaches_target(a in arb_state(), b in arb_state()) {
        let engine = DiffEngine::default();
        let diff = engine.compute(&a, &b).unwrap();
        let applied = engine.apply(&a, &diff).unwrap();
        prop_assert_eq!(applied, b);
    }

    #[test]
    fn diff_against_self_is_empty(a in arb_state()) {
        let engine = DiffEngine::default();
        prop_assert!(engine.compute(&a, &a.clone()).unwrap().is_empty());
    }
}
