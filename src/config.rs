use std::time::Duration;

use crate::constants::{
    COUNTDOWN_DELAY, MAZE_HEIGHT, MAZE_WIDTH, MIN_MAZE_SIDE, MIN_PLAYERS_TO_START,
    WIN_RESET_DELAY,
};

/// Errors raised while validating startup configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Carving runs on a 2-step lattice and needs an odd side with interior room.
    #[error("maze dimensions must be odd and at least 5, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("minimum player count must be at least 1")]
    InvalidMinPlayers,
}

/// Maze size that the generator accepts without further checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MazeDimensions {
    width: i32,
    height: i32,
}

impl MazeDimensions {
    pub fn new(width: usize, height: usize) -> Result<Self, ConfigError> {
        let valid_side = |side: usize| side >= MIN_MAZE_SIDE && side % 2 == 1 && side <= 4_095;
        if !valid_side(width) || !valid_side(height) {
            return Err(ConfigError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width: width as i32,
            height: height as i32,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }
}

impl Default for MazeDimensions {
    fn default() -> Self {
        Self {
            width: MAZE_WIDTH as i32,
            height: MAZE_HEIGHT as i32,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameConfig {
    pub dimensions: MazeDimensions,
    pub countdown_delay: Duration,
    pub win_reset_delay: Duration,
    pub min_players: usize,
}

impl GameConfig {
    pub fn new(
        dimensions: MazeDimensions,
        countdown_delay: Duration,
        win_reset_delay: Duration,
        min_players: usize,
    ) -> Result<Self, ConfigError> {
        if min_players == 0 {
            return Err(ConfigError::InvalidMinPlayers);
        }
        Ok(Self {
            dimensions,
            countdown_delay,
            win_reset_delay,
            min_players,
        })
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            dimensions: MazeDimensions::default(),
            countdown_delay: COUNTDOWN_DELAY,
            win_reset_delay: WIN_RESET_DELAY,
            min_players: MIN_PLAYERS_TO_START,
        }
    }
}
