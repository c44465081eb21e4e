//! Error handling tests for tacsync-state

use serde_json::json;
use tacsync_state::{
    Character, Diff, DiffEngine, GameInfo, Patch, Position, SharedState, StateError,
    StateSynchronizer, StateUpdate,
};

fn state() -> SharedState {
    SharedState {
        game: GameInfo {
            turn: "p1".to_string(),
            players: vec!["p1".to_string(), "p2".to_string()],
            ..Default::default()
        },
        characters: vec![Character {
            name: "alpha".to_string(),
            owner: "p1".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn test_patch_into_missing_character_is_malformed() {
    let engine = DiffEngine::default();
    let diff = Diff::new(vec![Patch::replace(
        vec!["characters".into(), 3.into(), "position".into()],
        json!({"x": 1, "y": 1}),
    )]);

    match engine.apply(&state(), &diff) {
        Err(StateError::MalformedDiff { index, reason }) => {
            assert_eq!(index, 0);
            assert!(reason.contains("parent missing"), "reason: {reason}");
        }
        other => panic!("expected malformed diff, got {other:?}"),
    }
}

#[test]
fn test_add_without_value_is_malformed() {
    let engine = DiffEngine::default();
    let diff = Diff::new(vec![Patch {
        path: vec!["messages".into(), 0.into()],
        op: tacsync_state::PatchOp::Add,
        value: None,
    }]);

    assert!(matches!(
        engine.apply(&state(), &diff),
        Err(StateError::MalformedDiff { .. })
    ));
}

#[test]
fn test_patched_value_must_fit_schema() {
    let engine = DiffEngine::default();
    let diff = Diff::new(vec![Patch::replace(
        vec!["game".into(), "turn".into()],
        json!(42),
    )]);

    assert!(matches!(
        engine.apply(&state(), &diff),
        Err(StateError::MalformedDiff { .. })
    ));
}

#[test]
fn test_malformed_delta_discards_guest_baseline() {
    let mut guest = StateSynchronizer::default();
    guest.apply_sync(state());

    let bad = Diff::new(vec![Patch::remove(vec!["nothing".into()])]).with_version(2);
    assert!(guest.apply_update(&bad).is_err());
    assert!(!guest.has_baseline());

    let good = Diff::new(Vec::new()).with_version(3);
    assert!(matches!(
        guest.apply_update(&good),
        Err(StateError::NoBaseline)
    ));
}

#[test]
fn test_reset_forces_full_state() {
    let mut host = StateSynchronizer::default();
    let mut s = state();
    host.update_state(&s).unwrap();

    host.reset();
    s.characters[0].position = Position::new(5, 5);
    let update = host.update_state(&s).unwrap();
    assert!(matches!(update, Some(StateUpdate::FullState { seq: 2, .. })));
}

#[test]
fn test_state_bytes_reject_garbage() {
    assert!(matches!(
        SharedState::from_bytes(b"{not json"),
        Err(StateError::DeserializationError(_))
    ));

    let bytes = state().to_bytes().unwrap();
    assert_eq!(SharedState::from_bytes(&bytes).unwrap(), state());
}
