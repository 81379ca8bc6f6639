use serde::Serialize;
use serde_json::Value;

use crate::types::{Direction, Player, Snapshot};

#[derive(Debug, PartialEq, Eq)]
pub enum ParsedClientMessage {
    Join { name: String },
    Move { direction: Direction },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    JoinAck { player: Player },
    StateUpdate { state: Snapshot },
    RoundWon { player: Player },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Only plain structs and strings inside; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Lenient parser for inbound frames. Anything malformed or unknown is `None`
/// and gets dropped before it reaches the game.
pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "join" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ParsedClientMessage::Join { name })
        }
        "move" => {
            let direction = Direction::parse_move(object.get("direction")?.as_str()?)?;
            Some(ParsedClientMessage::Move { direction })
        }
        _ => None,
    }
}
