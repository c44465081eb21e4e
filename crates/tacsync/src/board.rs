//! Deterministic starting boards

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tacsync_network::RoomMember;
use tacsync_state::{
    Character, GameInfo, Item, LogEntry, MapGrid, PlayerMeta, Pool, Position, SharedState,
    Terrain,
};

pub const DEFAULT_WIDTH: u32 = 40;
pub const DEFAULT_HEIGHT: u32 = 40;

/// Walled grid with scattered cover and water, identical for a given seed
pub fn generate_map(width: u32, height: u32, seed: u64) -> MapGrid {
    let mut map = MapGrid::filled(width, height, Terrain::Floor);
    let mut rng = StdRng::seed_from_u64(seed);

    for (y, row) in map.cells.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            let edge = x == 0 || y == 0 || x + 1 == width as usize || y + 1 == height as usize;
            if edge {
                cell.terrain = Terrain::Wall;
                continue;
            }
            cell.terrain = match rng.gen_range(0..32u32) {
                0 | 1 => Terrain::Cover,
                2 => Terrain::Water,
                _ => Terrain::Floor,
            };
        }
    }
    map
}

/// One character per member, facing off across the middle row
pub fn skirmish(members: &[RoomMember], seed: u64) -> SharedState {
    let mut map = generate_map(DEFAULT_WIDTH, DEFAULT_HEIGHT, seed);
    let mid = (DEFAULT_HEIGHT / 2) as i32 + 5;
    let mut characters = Vec::with_capacity(members.len());

    for (i, member) in members.iter().enumerate() {
        let slot = i as i32;
        let position = Position::new(20 + 5 * (slot % 4), mid + 2 * (slot / 4));
        let mut name = member.name.to_lowercase();
        if characters.iter().any(|c: &Character| c.name == name) {
            name = format!("{}-{}", name, member.id);
        }
        if let Some(cell) = map.cell_mut(position) {
            cell.terrain = Terrain::Floor;
            cell.occupant = Some(name.clone());
        }
        characters.push(Character {
            name,
            owner: member.id.clone(),
            position,
            health: Pool::full(10),
            action_points: Pool::full(4),
            equipment: vec![Item {
                name: "rifle".to_string(),
                damage: 3,
                range: 8,
            }],
            path: Vec::new(),
        });
    }

    SharedState {
        game: GameInfo {
            turn: members.first().map(|m| m.id.clone()).unwrap_or_default(),
            players: members.iter().map(|m| m.id.clone()).collect(),
            player_info: members
                .iter()
                .map(|m| {
                    (
                        m.id.clone(),
                        PlayerMeta {
                            name: m.name.clone(),
                            is_ai: false,
                        },
                    )
                })
                .collect(),
        },
        characters,
        map,
        messages: vec![LogEntry::system("Deployment complete")],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<RoomMember> {
        ["p1", "p2"]
            .iter()
            .enumerate()
            .map(|(i, id)| RoomMember {
                id: id.to_string(),
                name: format!("squad-{}", i + 1),
                ready: true,
            })
            .collect()
    }

    #[test]
    fn test_same_seed_same_board() {
        assert_eq!(generate_map(16, 12, 7), generate_map(16, 12, 7));
        assert_ne!(generate_map(16, 12, 7), generate_map(16, 12, 8));
    }

    #[test]
    fn test_border_is_walled() {
        let map = generate_map(10, 10, 1);
        assert_eq!(map.cell(Position::new(0, 4)).unwrap().terrain, Terrain::Wall);
        assert_eq!(map.cell(Position::new(9, 9)).unwrap().terrain, Terrain::Wall);
    }

    #[test]
    fn test_skirmish_is_valid() {
        let state = skirmish(&members(), 3);
        state.validate().unwrap();
        assert_eq!(state.game.turn, "p1");
        assert_eq!(state.characters[0].position, Position::new(20, 25));
        assert_eq!(state.characters[1].position, Position::new(25, 25));
        assert!(state
            .characters
            .iter()
            .all(|c| state.map.cell(c.position).unwrap().terrain.is_walkable()));
    }
}
