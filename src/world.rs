use std::collections::HashMap;

use log::debug;

use crate::config::MazeDimensions;
use crate::constants::{CORNER_SLOT_COUNT, MAX_NAME_LEN};
use crate::maze::{generate_maze, Maze};
use crate::rng::Rng;
use crate::types::{Direction, Player, Position, Snapshot};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Rejected,
    Moved,
    /// The move landed on the exit cell. The round has not been ended yet;
    /// that is the lifecycle's call.
    ReachedExit,
}

#[derive(Clone, Debug)]
struct PlayerEntry {
    player: Player,
    join_seq: u64,
}

/// The single authoritative game world: maze, players and round flags.
#[derive(Clone, Debug)]
pub struct WorldState {
    pub maze: Maze,
    pub round_active: bool,
    pub round_id: u64,

    dimensions: MazeDimensions,
    rng: Rng,
    players: HashMap<String, PlayerEntry>,
    next_join_seq: u64,
}

impl WorldState {
    pub fn new(dimensions: MazeDimensions, mut rng: Rng) -> Self {
        let maze = generate_maze(dimensions, &mut rng);
        Self {
            maze,
            round_active: false,
            round_id: 0,
            dimensions,
            rng,
            players: HashMap::new(),
            next_join_seq: 0,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id).map(|entry| &entry.player)
    }

    /// Start cells in join order: top-left, bottom-right, bottom-left, top-right.
    pub fn corner_slots(&self) -> [Position; CORNER_SLOT_COUNT] {
        let right = self.dimensions.width() - 2;
        let bottom = self.dimensions.height() - 2;
        [
            Position::new(1, 1),
            Position::new(right, bottom),
            Position::new(1, bottom),
            Position::new(right, 1),
        ]
    }

    /// Registers a player at the corner slot picked by the current head count.
    /// Returns `None` for duplicate ids or names that are blank after trimming.
    pub fn add_player(&mut self, player_id: &str, requested_name: &str) -> Option<Player> {
        if self.players.contains_key(player_id) {
            debug!("ignoring duplicate join from {player_id}");
            return None;
        }
        let Some(name) = sanitize_name(requested_name) else {
            debug!("ignoring join with blank name from {player_id}");
            return None;
        };

        let slot = self.players.len() % CORNER_SLOT_COUNT;
        let player = Player {
            id: player_id.to_string(),
            name,
            position: self.corner_slots()[slot],
            color: self.rng.hex_color(),
        };
        let join_seq = self.next_join_seq;
        self.next_join_seq += 1;
        self.players.insert(
            player_id.to_string(),
            PlayerEntry {
                player: player.clone(),
                join_seq,
            },
        );
        Some(player)
    }

    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        self.players.remove(player_id).map(|entry| entry.player)
    }

    /// Unit-step move validation. Rejections leave the world untouched.
    pub fn apply_move(&mut self, player_id: &str, dir: Direction) -> MoveOutcome {
        if !self.round_active {
            return MoveOutcome::Rejected;
        }
        let Some(entry) = self.players.get_mut(player_id) else {
            return MoveOutcome::Rejected;
        };

        let target = entry.player.position.step(dir);
        if !self.maze.is_open(target) {
            return MoveOutcome::Rejected;
        }

        entry.player.position = target;
        if target == self.maze.exit {
            MoveOutcome::ReachedExit
        } else {
            MoveOutcome::Moved
        }
    }

    /// Replaces the maze and bumps `round_id`. Players keep their positions;
    /// anyone left standing in a new wall is moved to the nearest lattice cell.
    pub fn regenerate_maze(&mut self) {
        self.maze = generate_maze(self.dimensions, &mut self.rng);
        self.round_id += 1;

        for entry in self.players.values_mut() {
            let pos = entry.player.position;
            if self.maze.is_open(pos) {
                continue;
            }
            let snapped = Position::new(to_lattice(pos.x), to_lattice(pos.y));
            debug!(
                "player {} was walled in at ({},{}); moved to ({},{})",
                entry.player.id, pos.x, pos.y, snapped.x, snapped.y
            );
            entry.player.position = snapped;
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut entries: Vec<&PlayerEntry> = self.players.values().collect();
        entries.sort_by_key(|entry| entry.join_seq);
        Snapshot {
            players: entries.into_iter().map(|entry| entry.player.clone()).collect(),
            width: self.maze.width,
            height: self.maze.height,
            maze: self.maze.tiles(),
            start: self.maze.start,
            exit: self.maze.exit,
            round_active: self.round_active,
            round_id: self.round_id,
        }
    }
}

// Interior coordinates are 1..=side-2; even ones step back onto the odd lattice.
fn to_lattice(value: i32) -> i32 {
    if value % 2 == 0 {
        value - 1
    } else {
        value
    }
}

pub fn sanitize_name(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}
