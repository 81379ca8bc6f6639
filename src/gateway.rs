//! Connection-facing side of the core.
//!
//! Each call consumes one inbound event and returns the [`Effects`] the
//! transport must carry out, in order: targeted replies and broadcasts, plus
//! transitions to fire later through [`SessionGateway::fire`]. The gateway
//! never touches sockets or clocks itself.

use log::info;

use crate::config::GameConfig;
use crate::lifecycle::{FireOutcome, MoveResult, RoundLifecycle, RoundPhase, ScheduledTransition};
use crate::protocol::ServerMessage;
use crate::rng::Rng;
use crate::types::{Direction, Snapshot};

#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Reply {
        connection_id: String,
        message: ServerMessage,
    },
    Broadcast(ServerMessage),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Effects {
    pub outbound: Vec<Outbound>,
    pub timers: Vec<ScheduledTransition>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.timers.is_empty()
    }

    fn reply(&mut self, connection_id: &str, message: ServerMessage) {
        self.outbound.push(Outbound::Reply {
            connection_id: connection_id.to_string(),
            message,
        });
    }

    fn broadcast(&mut self, message: ServerMessage) {
        self.outbound.push(Outbound::Broadcast(message));
    }
}

#[derive(Clone, Debug)]
pub struct SessionGateway {
    lifecycle: RoundLifecycle,
}

impl SessionGateway {
    pub fn new(config: GameConfig, rng: Rng) -> Self {
        Self {
            lifecycle: RoundLifecycle::new(config, rng),
        }
    }

    pub fn lifecycle(&self) -> &RoundLifecycle {
        &self.lifecycle
    }

    pub fn phase(&self) -> RoundPhase {
        self.lifecycle.phase()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lifecycle.world().snapshot()
    }

    pub fn join(&mut self, connection_id: &str, display_name: &str) -> Effects {
        let mut effects = Effects::default();
        let Some(player) = self
            .lifecycle
            .world_mut()
            .add_player(connection_id, display_name)
        else {
            return effects;
        };
        info!(
            "{} joined as {} at ({},{})",
            player.name, player.id, player.position.x, player.position.y
        );

        effects.reply(connection_id, ServerMessage::JoinAck { player });
        effects.timers.extend(self.lifecycle.on_player_joined());
        effects.broadcast(self.state_update());
        effects
    }

    pub fn move_player(&mut self, connection_id: &str, dir: Direction) -> Effects {
        let mut effects = Effects::default();
        match self.lifecycle.apply_move(connection_id, dir) {
            MoveResult::Rejected => {}
            MoveResult::Moved => effects.broadcast(self.state_update()),
            MoveResult::Won { winner, reset } => {
                effects.broadcast(ServerMessage::RoundWon { player: winner });
                effects.broadcast(self.state_update());
                effects.timers.push(reset);
            }
        }
        effects
    }

    pub fn disconnect(&mut self, connection_id: &str) -> Effects {
        let mut effects = Effects::default();
        let Some(player) = self.lifecycle.world_mut().remove_player(connection_id) else {
            return effects;
        };
        info!("{} ({}) left", player.name, player.id);

        effects.broadcast(self.state_update());
        if self.lifecycle.on_player_left() {
            effects.broadcast(self.state_update());
        }
        effects
    }

    pub fn fire(&mut self, transition: ScheduledTransition) -> Effects {
        let mut effects = Effects::default();
        if self.lifecycle.fire(transition) == FireOutcome::RoundStarted {
            effects.broadcast(self.state_update());
        }
        effects
    }

    fn state_update(&self) -> ServerMessage {
        ServerMessage::StateUpdate {
            state: self.snapshot(),
        }
    }
}
