//! Turn a snapshot transition back into discrete mutation events
//!
//! Guests receive structural diffs; exploding old-vs-new baselines lets them
//! feed remote changes through the same `GameStore::apply` path as local
//! intents. Values are absolute (`HealthChanged`, not `CharacterDamaged`) so
//! replaying an event the peer already applied locally is harmless.

use crate::events::MutationEvent;
use std::collections::BTreeMap;
use tacsync_state::{Character, SharedState};

pub fn explode(old: &SharedState, new: &SharedState) -> Vec<MutationEvent> {
    let mut events = Vec::new();

    if old.game.turn != new.game.turn {
        events.push(MutationEvent::TurnChanged {
            player: new.game.turn.clone(),
        });
    }

    explode_characters(old, new, &mut events);

    if new.messages.starts_with(&old.messages) {
        for entry in &new.messages[old.messages.len()..] {
            events.push(MutationEvent::MessageLogged {
                entry: entry.clone(),
            });
        }
    }

    let empty = BTreeMap::new();
    let old_watch = old.overwatch.as_ref().unwrap_or(&empty);
    let new_watch = new.overwatch.as_ref().unwrap_or(&empty);
    for name in old_watch.keys().filter(|k| !new_watch.contains_key(*k)) {
        events.push(MutationEvent::OverwatchChanged {
            name: name.clone(),
            trigger: None,
        });
    }
    for (name, trigger) in new_watch {
        if old_watch.get(name) != Some(trigger) {
            events.push(MutationEvent::OverwatchChanged {
                name: name.clone(),
                trigger: Some(trigger.clone()),
            });
        }
    }

    explode_ui(old, new, &mut events);
    events
}

fn explode_characters(old: &SharedState, new: &SharedState, events: &mut Vec<MutationEvent>) {
    for gone in old
        .characters
        .iter()
        .filter(|c| new.character(&c.name).is_none())
    {
        events.push(MutationEvent::CharacterRemoved {
            name: gone.name.clone(),
        });
    }

    for current in &new.characters {
        match old.character(&current.name) {
            None => events.push(MutationEvent::CharacterAdded {
                character: current.clone(),
            }),
            Some(previous) => explode_character(previous, current, events),
        }
    }
}

fn explode_character(previous: &Character, current: &Character, events: &mut Vec<MutationEvent>) {
    let name = &current.name;

    if previous.position != current.position {
        events.push(MutationEvent::CharacterPosition {
            name: name.clone(),
            position: current.position,
        });
    }
    if previous.path != current.path {
        events.push(MutationEvent::CharacterPath {
            name: name.clone(),
            path: current.path.clone(),
        });
    }
    if previous.action_points != current.action_points {
        events.push(MutationEvent::ActionPointsChanged {
            name: name.clone(),
            action_points: current.action_points,
        });
    }
    if previous.health != current.health {
        events.push(MutationEvent::HealthChanged {
            name: name.clone(),
            health: current.health,
        });
    }
}

fn explode_ui(old: &SharedState, new: &SharedState, events: &mut Vec<MutationEvent>) {
    let (old_ui, new_ui) = (&old.ui, &new.ui);

    for name in old_ui
        .animations
        .keys()
        .filter(|k| !new_ui.animations.contains_key(*k))
    {
        events.push(MutationEvent::AnimationChanged {
            name: name.clone(),
            animation: None,
        });
    }
    for (name, animation) in &new_ui.animations {
        if old_ui.animations.get(name) != Some(animation) {
            events.push(MutationEvent::AnimationChanged {
                name: name.clone(),
                animation: Some(animation.clone()),
            });
        }
    }

    for gone in old_ui
        .projectiles
        .iter()
        .filter(|p| !new_ui.projectiles.iter().any(|n| n.id == p.id))
    {
        events.push(MutationEvent::ProjectileRemoved {
            id: gone.id.clone(),
        });
    }
    for projectile in &new_ui.projectiles {
        if !old_ui.projectiles.contains(projectile) {
            events.push(MutationEvent::ProjectileAdded {
                projectile: projectile.clone(),
            });
        }
    }
}
