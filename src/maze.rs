use std::collections::{HashSet, VecDeque};

use log::warn;

use crate::config::MazeDimensions;
use crate::constants::EXIT_SCAN_ATTEMPTS;
use crate::rng::Rng;
use crate::types::{Cell, Position};

const LATTICE_STEPS: [(i32, i32); 4] = [(0, -2), (2, 0), (0, 2), (-2, 0)];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Maze {
    pub width: i32,
    pub height: i32,
    pub grid: Vec<Vec<Cell>>,
    pub start: Position,
    pub exit: Position,
}

impl Maze {
    pub fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        self.grid
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    pub fn is_open(&self, pos: Position) -> bool {
        self.cell(pos.x, pos.y) == Some(Cell::Open)
    }

    pub fn tiles(&self) -> Vec<String> {
        self.grid
            .iter()
            .map(|row| row.iter().map(|cell| cell.glyph()).collect::<String>())
            .collect()
    }

    pub fn open_cells(&self) -> impl Iterator<Item = Position> + '_ {
        self.grid.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, cell)| **cell == Cell::Open)
                .map(move |(x, _)| Position::new(x as i32, y as i32))
        })
    }

    /// Open cells reachable from `from` through 4-neighbour Open adjacency.
    pub fn reachable_from(&self, from: Position) -> HashSet<Position> {
        let mut out = HashSet::new();
        if !self.is_open(from) {
            return out;
        }

        let mut queue = VecDeque::new();
        out.insert(from);
        queue.push_back(from);

        while let Some(Position { x, y }) = queue.pop_front() {
            for next in [
                Position::new(x - 1, y),
                Position::new(x + 1, y),
                Position::new(x, y - 1),
                Position::new(x, y + 1),
            ] {
                if self.is_open(next) && out.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        out
    }
}

/// Depth-first carving on the odd-coordinate lattice starting at (1,1),
/// followed by exit placement in column `width - 2`.
pub fn generate_maze(dimensions: MazeDimensions, rng: &mut Rng) -> Maze {
    let width = dimensions.width();
    let height = dimensions.height();
    let mut grid = vec![vec![Cell::Wall; width as usize]; height as usize];

    let start = Position::new(1, 1);
    grid[start.y as usize][start.x as usize] = Cell::Open;
    let mut stack = vec![start];

    while let Some(&current) = stack.last() {
        let candidates: Vec<(i32, i32)> = LATTICE_STEPS
            .iter()
            .copied()
            .filter(|&(dx, dy)| {
                let nx = current.x + dx;
                let ny = current.y + dy;
                nx > 0
                    && nx < width - 1
                    && ny > 0
                    && ny < height - 1
                    && grid[ny as usize][nx as usize] == Cell::Wall
            })
            .collect();

        if candidates.is_empty() {
            stack.pop();
            continue;
        }

        let (dx, dy) = candidates[rng.pick_index(candidates.len())];
        let next = Position::new(current.x + dx, current.y + dy);
        grid[next.y as usize][next.x as usize] = Cell::Open;
        grid[(current.y + dy / 2) as usize][(current.x + dx / 2) as usize] = Cell::Open;
        stack.push(next);
    }

    let exit = pick_exit(&grid, width, height, rng).unwrap_or(start);

    Maze {
        width,
        height,
        grid,
        start,
        exit,
    }
}

fn pick_exit(grid: &[Vec<Cell>], width: i32, height: i32, rng: &mut Rng) -> Option<Position> {
    let x = width - 2;
    let is_open = |y: i32| grid[y as usize][x as usize] == Cell::Open;

    for _ in 0..EXIT_SCAN_ATTEMPTS {
        let y = rng.range_inclusive(1, (height - 2) as usize) as i32;
        if is_open(y) {
            return Some(Position::new(x, y));
        }
    }

    warn!("exit probes exhausted, scanning column {x} for the first open cell");
    (1..height - 1).find(|&y| is_open(y)).map(|y| Position::new(x, y))
}
