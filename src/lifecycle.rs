//! Round state machine layered over [`WorldState`].
//!
//! Timed transitions are handed out as [`ScheduledTransition`] values tagged
//! with the `round_id` current when they were scheduled. Nothing is ever
//! cancelled: when a transition fires, [`RoundLifecycle::fire`] compares the
//! tag with the live generation and drops stale ones.

use std::time::Duration;

use log::{debug, info};

use crate::config::GameConfig;
use crate::rng::Rng;
use crate::types::{Direction, Player};
use crate::world::{MoveOutcome, WorldState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    Waiting,
    Countdown,
    Active,
    WinPause,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    StartRound,
    ResetRound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledTransition {
    pub kind: TransitionKind,
    pub round_id: u64,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveResult {
    Rejected,
    Moved,
    Won {
        winner: Player,
        reset: ScheduledTransition,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    Ignored,
    /// Fired on time but too few players were left; the round went back to Waiting.
    Abandoned,
    RoundStarted,
}

#[derive(Clone, Debug)]
pub struct RoundLifecycle {
    world: WorldState,
    config: GameConfig,
    pending_start: Option<u64>,
    pending_reset: Option<u64>,
}

impl RoundLifecycle {
    pub fn new(config: GameConfig, rng: Rng) -> Self {
        let world = WorldState::new(config.dimensions, rng);
        Self {
            world,
            config,
            pending_start: None,
            pending_reset: None,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn phase(&self) -> RoundPhase {
        if self.world.round_active {
            RoundPhase::Active
        } else if self.pending_reset.is_some() {
            RoundPhase::WinPause
        } else if self.pending_start.is_some()
            && self.world.player_count() >= self.config.min_players
        {
            RoundPhase::Countdown
        } else {
            RoundPhase::Waiting
        }
    }

    /// Call after a player was added. Starts a countdown when the head count
    /// reaches the minimum from Waiting.
    pub fn on_player_joined(&mut self) -> Option<ScheduledTransition> {
        if self.world.player_count() < self.config.min_players
            || self.world.round_active
            || self.pending_start.is_some()
            || self.pending_reset.is_some()
        {
            return None;
        }

        let round_id = self.world.round_id;
        self.pending_start = Some(round_id);
        info!(
            "{} players present, round starts in {:?}",
            self.world.player_count(),
            self.config.countdown_delay
        );
        Some(ScheduledTransition {
            kind: TransitionKind::StartRound,
            round_id,
            delay: self.config.countdown_delay,
        })
    }

    /// Call after a player was removed. Returns true when an active round was
    /// stopped. The maze is kept as is.
    pub fn on_player_left(&mut self) -> bool {
        if !self.world.round_active || self.world.player_count() >= self.config.min_players {
            return false;
        }
        self.world.round_active = false;
        info!(
            "round {} paused: only {} player(s) left",
            self.world.round_id,
            self.world.player_count()
        );
        true
    }

    pub fn apply_move(&mut self, player_id: &str, dir: Direction) -> MoveResult {
        match self.world.apply_move(player_id, dir) {
            MoveOutcome::Rejected => {
                debug!("rejected move {dir:?} from {player_id}");
                MoveResult::Rejected
            }
            MoveOutcome::Moved => MoveResult::Moved,
            MoveOutcome::ReachedExit => {
                let Some(winner) = self.world.player(player_id).cloned() else {
                    return MoveResult::Moved;
                };
                self.world.round_active = false;
                let round_id = self.world.round_id;
                self.pending_reset = Some(round_id);
                info!("{} found the exit in round {round_id}", winner.name);
                MoveResult::Won {
                    winner,
                    reset: ScheduledTransition {
                        kind: TransitionKind::ResetRound,
                        round_id,
                        delay: self.config.win_reset_delay,
                    },
                }
            }
        }
    }

    pub fn fire(&mut self, transition: ScheduledTransition) -> FireOutcome {
        let pending = match transition.kind {
            TransitionKind::StartRound => &mut self.pending_start,
            TransitionKind::ResetRound => &mut self.pending_reset,
        };
        if *pending != Some(transition.round_id) || transition.round_id != self.world.round_id {
            debug!(
                "dropping stale {:?} for round {} (current {})",
                transition.kind, transition.round_id, self.world.round_id
            );
            return FireOutcome::Ignored;
        }
        *pending = None;

        if self.world.round_active {
            return FireOutcome::Ignored;
        }
        if self.world.player_count() < self.config.min_players {
            info!(
                "{:?} for round {} abandoned: {} player(s) present",
                transition.kind,
                transition.round_id,
                self.world.player_count()
            );
            return FireOutcome::Abandoned;
        }

        self.world.regenerate_maze();
        self.world.round_active = true;
        info!(
            "round {} started with {} players",
            self.world.round_id,
            self.world.player_count()
        );
        FireOutcome::RoundStarted
    }
}
