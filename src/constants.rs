use std::time::Duration;

pub const MAZE_WIDTH: usize = 21;
pub const MAZE_HEIGHT: usize = 21;
pub const MIN_MAZE_SIDE: usize = 5;

pub const COUNTDOWN_DELAY: Duration = Duration::from_secs(3);
pub const WIN_RESET_DELAY: Duration = Duration::from_secs(10);

pub const MIN_PLAYERS_TO_START: usize = 2;
pub const CORNER_SLOT_COUNT: usize = 4;

pub const MAX_NAME_LEN: usize = 16;

/// Random row probes for the exit before falling back to a column scan.
pub const EXIT_SCAN_ATTEMPTS: usize = 64;
