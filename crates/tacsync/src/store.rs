//! Live game state and the single mutation-application path

use crate::events::MutationEvent;
use tacsync_state::{Position, SharedState};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    #[error("Character {0} already exists")]
    DuplicateCharacter(String),

    #[error("{name} cannot move to ({}, {}): outside the map", .position.x, .position.y)]
    OutOfBounds { name: String, position: Position },
}

/// The mutable state a peer renders from
#[derive(Debug, Clone, Default)]
pub struct GameStore {
    state: SharedState,
}

impl GameStore {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Replace everything, presentation included
    pub fn load(&mut self, state: SharedState) {
        self.state = state;
    }

    /// Take an authoritative snapshot while keeping local presentation state
    pub fn adopt(&mut self, state: SharedState) {
        let ui = std::mem::take(&mut self.state.ui);
        self.state = state;
        self.state.ui = ui;
    }

    pub fn apply(&mut self, event: &MutationEvent) -> Result<(), MutationError> {
        trace!("Applying {}", event.kind());
        let state = &mut self.state;

        match event {
            MutationEvent::TurnChanged { player } => {
                if !state.game.players.contains(player) {
                    return Err(MutationError::UnknownPlayer(player.clone()));
                }
                state.game.turn = player.clone();
                for character in state.characters.iter_mut().filter(|c| c.owner == *player) {
                    character.action_points.refill();
                }
            }
            MutationEvent::CharacterPosition { name, position } => {
                let has_map = state.map.width > 0 && state.map.height > 0;
                if has_map && !state.map.contains(*position) {
                    return Err(MutationError::OutOfBounds {
                        name: name.clone(),
                        position: *position,
                    });
                }
                let character = state
                    .character_mut(name)
                    .ok_or_else(|| MutationError::UnknownCharacter(name.clone()))?;
                let previous = std::mem::replace(&mut character.position, *position);

                if let Some(cell) = state.map.cell_mut(previous) {
                    if cell.occupant.as_deref() == Some(name.as_str()) {
                        cell.occupant = None;
                    }
                }
                if let Some(cell) = state.map.cell_mut(*position) {
                    cell.occupant = Some(name.clone());
                }
            }
            MutationEvent::CharacterPath { name, path } => {
                character(state, name)?.path = path.clone();
            }
            MutationEvent::ActionPointsSpent { name, amount } => {
                character(state, name)?.action_points.drain(*amount);
            }
            MutationEvent::ActionPointsChanged {
                name,
                action_points,
            } => {
                character(state, name)?.action_points = *action_points;
            }
            MutationEvent::CharacterDamaged { name, amount, .. } => {
                character(state, name)?.health.drain(*amount);
            }
            MutationEvent::HealthChanged { name, health } => {
                character(state, name)?.health = *health;
            }
            MutationEvent::CharacterAdded { character } => {
                if state.character(&character.name).is_some() {
                    return Err(MutationError::DuplicateCharacter(character.name.clone()));
                }
                if let Some(cell) = state.map.cell_mut(character.position) {
                    cell.occupant = Some(character.name.clone());
                }
                state.characters.push(character.clone());
            }
            MutationEvent::CharacterRemoved { name } => {
                let index = state
                    .characters
                    .iter()
                    .position(|c| c.name == *name)
                    .ok_or_else(|| MutationError::UnknownCharacter(name.clone()))?;
                let removed = state.characters.remove(index);
                if let Some(cell) = state.map.cell_mut(removed.position) {
                    if cell.occupant.as_deref() == Some(name.as_str()) {
                        cell.occupant = None;
                    }
                }
                if let Some(overwatch) = state.overwatch.as_mut() {
                    overwatch.remove(name);
                }
                state.ui.animations.remove(name);
            }
            MutationEvent::MessageLogged { entry } => {
                state.messages.push(entry.clone());
            }
            MutationEvent::OverwatchChanged { name, trigger } => match trigger {
                Some(trigger) => {
                    state
                        .overwatch
                        .get_or_insert_with(Default::default)
                        .insert(name.clone(), trigger.clone());
                }
                None => {
                    if let Some(overwatch) = state.overwatch.as_mut() {
                        overwatch.remove(name);
                        if overwatch.is_empty() {
                            state.overwatch = None;
                        }
                    }
                }
            },
            MutationEvent::AnimationChanged { name, animation } => match animation {
                Some(animation) => {
                    state.ui.animations.insert(name.clone(), animation.clone());
                }
                None => {
                    state.ui.animations.remove(name);
                }
            },
            MutationEvent::ProjectileAdded { projectile } => {
                let projectiles = &mut state.ui.projectiles;
                match projectiles.iter_mut().find(|p| p.id == projectile.id) {
                    Some(existing) => *existing = projectile.clone(),
                    None => projectiles.push(projectile.clone()),
                }
            }
            MutationEvent::ProjectileRemoved { id } => {
                state.ui.projectiles.retain(|p| p.id != *id);
            }
            MutationEvent::HighlightsChanged { cells } => {
                state.ui.highlights = cells.clone();
            }
        }

        Ok(())
    }
}

fn character<'a>(
    state: &'a mut SharedState,
    name: &str,
) -> Result<&'a mut tacsync_state::Character, MutationError> {
    state
        .character_mut(name)
        .ok_or_else(|| MutationError::UnknownCharacter(name.to_string()))
}
