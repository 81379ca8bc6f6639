use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use maze_race_server::config::{ConfigError, GameConfig, MazeDimensions};
use maze_race_server::constants::{MAZE_HEIGHT, MAZE_WIDTH, MIN_PLAYERS_TO_START};
use maze_race_server::gateway::{Effects, Outbound, SessionGateway};
use maze_race_server::lifecycle::ScheduledTransition;
use maze_race_server::protocol::{parse_client_message, ParsedClientMessage};
use maze_race_server::rng::Rng;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const CLIENT_QUEUE_CAPACITY: usize = 256;

type SharedState = Arc<Mutex<ServerState>>;

/// Authoritative maze race server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,
    /// Directory with the browser client (index.html is the fallback page)
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
    /// Seed for maze generation and player colors; random when omitted
    #[arg(long, env = "MAZE_SEED")]
    seed: Option<u32>,
    #[arg(long, default_value_t = MAZE_WIDTH)]
    maze_width: usize,
    #[arg(long, default_value_t = MAZE_HEIGHT)]
    maze_height: usize,
    /// Delay between reaching the player minimum and the round start
    #[arg(long, default_value_t = 3)]
    countdown_secs: u64,
    /// Pause after a win before the next maze
    #[arg(long, default_value_t = 10)]
    win_reset_secs: u64,
    #[arg(long, default_value_t = MIN_PLAYERS_TO_START)]
    min_players: usize,
}

impl Args {
    fn game_config(&self) -> Result<GameConfig, ConfigError> {
        GameConfig::new(
            MazeDimensions::new(self.maze_width, self.maze_height)?,
            Duration::from_secs(self.countdown_secs),
            Duration::from_secs(self.win_reset_secs),
            self.min_players,
        )
    }
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<String>,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    gateway: SessionGateway,
}

impl ServerState {
    fn new(gateway: SessionGateway) -> Self {
        Self {
            clients: HashMap::new(),
            gateway,
        }
    }

    /// Queues `payload` for one client. False when its queue is full or closed.
    fn send_to_client(&self, client_id: &str, payload: String) -> bool {
        match self.clients.get(client_id) {
            Some(client) => client.tx.try_send(payload).is_ok(),
            None => true,
        }
    }

    /// Queues `payload` for every connected client and returns the ones that
    /// could not keep up.
    fn broadcast(&self, payload: &str) -> Vec<String> {
        self.clients
            .iter()
            .filter(|(_, client)| client.tx.try_send(payload.to_string()).is_err())
            .map(|(client_id, _)| client_id.clone())
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.game_config()?;
    let rng = args.seed.map(Rng::new).unwrap_or_else(Rng::from_entropy);
    info!(
        "maze {}x{}, countdown {:?}, win reset {:?}, min players {}",
        config.dimensions.width(),
        config.dimensions.height(),
        config.countdown_delay,
        config.win_reset_delay,
        config.min_players
    );

    let state = Arc::new(Mutex::new(ServerState::new(SessionGateway::new(config, rng))));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/state", get(state_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir(args.static_dir) {
        let index_file = static_dir.join("index.html");
        info!("static file root: {}", static_dir.to_string_lossy());
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found; serving websocket and api only");
        app
    };

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {bind_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn resolve_static_dir(configured: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.join("index.html").is_file() {
            return Some(path);
        }
        warn!("{} has no index.html", path.to_string_lossy());
    }

    [PathBuf::from("public"), PathBuf::from("../public")]
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn state_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(guard.gateway.snapshot())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);
    let client_id = register_client(&state, tx).await;
    info!("{client_id} connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        let still_connected = match message {
            Message::Text(raw) => handle_client_message(&state, &client_id, raw.as_str()).await,
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&state, &client_id, text).await,
                Err(_) => {
                    debug!("{client_id} sent non-utf8 binary frame");
                    true
                }
            },
            Message::Close(_) => break,
            _ => true,
        };
        if !still_connected {
            break;
        }
    }

    handle_disconnect(&state, &client_id).await;
    info!("{client_id} disconnected");
    let _ = writer.await;
}

async fn register_client(state: &SharedState, tx: mpsc::Sender<String>) -> String {
    let client_id = make_id("client");
    let mut guard = state.lock().await;
    guard.clients.insert(client_id.clone(), ClientContext { tx });
    client_id
}

/// Returns false once the connection has been dropped by the server; frames
/// arriving after that never reach the gateway.
async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) -> bool {
    let mut guard = state.lock().await;
    if !guard.clients.contains_key(client_id) {
        debug!("ignoring frame from dropped connection {client_id}");
        return false;
    }
    let Some(message) = parse_client_message(raw) else {
        debug!("dropping malformed message from {client_id}");
        return true;
    };

    let effects = match message {
        ParsedClientMessage::Join { name } => guard.gateway.join(client_id, &name),
        ParsedClientMessage::Move { direction } => guard.gateway.move_player(client_id, direction),
    };
    dispatch(state, &mut guard, effects);
    guard.clients.contains_key(client_id)
}

async fn handle_disconnect(state: &SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    guard.clients.remove(client_id);
    let effects = guard.gateway.disconnect(client_id);
    dispatch(state, &mut guard, effects);
}

/// Carries out gateway effects while the caller still holds the state lock,
/// so every client sees messages in mutation order. Clients whose queue is
/// full are dropped and their departure is fed back through the gateway.
fn dispatch(state: &SharedState, server: &mut ServerState, effects: Effects) {
    let mut pending = VecDeque::from([effects]);
    while let Some(effects) = pending.pop_front() {
        let mut lagging = Vec::new();
        for outbound in effects.outbound {
            match outbound {
                Outbound::Reply {
                    connection_id,
                    message,
                } => {
                    if !server.send_to_client(&connection_id, message.to_json()) {
                        lagging.push(connection_id);
                    }
                }
                Outbound::Broadcast(message) => {
                    lagging.extend(server.broadcast(&message.to_json()));
                }
            }
        }

        for transition in effects.timers {
            schedule_transition(state.clone(), transition);
        }

        for client_id in lagging {
            if server.clients.remove(&client_id).is_some() {
                warn!("{client_id} cannot keep up, disconnecting");
                pending.push_back(server.gateway.disconnect(&client_id));
            }
        }
    }
}

fn schedule_transition(state: SharedState, transition: ScheduledTransition) {
    tokio::spawn(async move {
        tokio::time::sleep(transition.delay).await;
        let mut guard = state.lock().await;
        let effects = guard.gateway.fire(transition);
        dispatch(&state, &mut guard, effects);
    });
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use maze_race_server::lifecycle::RoundPhase;
    use maze_race_server::types::{Direction, Position};
    use serde_json::Value;

    fn make_state() -> SharedState {
        Arc::new(Mutex::new(ServerState::new(SessionGateway::new(
            GameConfig::default(),
            Rng::new(99),
        ))))
    }

    async fn connect(state: &SharedState) -> (String, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        (register_client(state, tx).await, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            out.push(serde_json::from_str(&raw).expect("server sends json"));
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_timer_starts_round_for_every_client() {
        let state = make_state();
        let (a, mut rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;

        handle_client_message(&state, &a, r#"{"type":"join","name":"A"}"#).await;
        handle_client_message(&state, &b, r#"{"type":"join","name":"B"}"#).await;

        let first = drain(&mut rx_a);
        assert_eq!(first[0]["type"], "joinAck");
        assert_eq!(first[0]["player"]["position"]["x"], 1);
        let latest = first.last().expect("a should see the second join");
        assert_eq!(latest["state"]["players"].as_array().map(Vec::len), Some(2));
        let second = drain(&mut rx_b);
        assert!(second.iter().any(|m| m["type"] == "joinAck" && m["player"]["position"]["x"] == 19));

        tokio::time::sleep(Duration::from_millis(3_100)).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let messages = drain(rx);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0]["type"], "stateUpdate");
            assert_eq!(messages[0]["state"]["roundActive"], true);
            assert_eq!(messages[0]["state"]["roundId"], 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_during_countdown_keeps_round_inactive() {
        let state = make_state();
        let (a, mut rx_a) = connect(&state).await;
        let (b, _rx_b) = connect(&state).await;

        handle_client_message(&state, &a, r#"{"type":"join","name":"A"}"#).await;
        handle_client_message(&state, &b, r#"{"type":"join","name":"B"}"#).await;
        handle_disconnect(&state, &b).await;
        drain(&mut rx_a);

        tokio::time::sleep(Duration::from_millis(3_100)).await;

        assert!(drain(&mut rx_a).is_empty());
        let guard = state.lock().await;
        assert!(!guard.gateway.snapshot().round_active);
        assert_eq!(guard.gateway.snapshot().round_id, 0);
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_silently() {
        let state = make_state();
        let (a, mut rx_a) = connect(&state).await;

        handle_client_message(&state, &a, "not json").await;
        handle_client_message(&state, &a, r#"{"type":"move","direction":"sideways"}"#).await;
        handle_client_message(&state, &a, r#"{"type":"join","name":"  "}"#).await;

        assert!(drain(&mut rx_a).is_empty());
        assert!(state.lock().await.gateway.snapshot().players.is_empty());
    }

    #[tokio::test]
    async fn lagging_client_is_disconnected_and_removed() {
        let state = make_state();
        let (a, _rx_a) = connect(&state).await;
        let (tx, rx_slow) = mpsc::channel(1);
        let slow = register_client(&state, tx).await;

        handle_client_message(&state, &slow, r#"{"type":"join","name":"Slow"}"#).await;
        handle_client_message(&state, &a, r#"{"type":"join","name":"A"}"#).await;

        let guard = state.lock().await;
        assert!(!guard.clients.contains_key(&slow));
        assert_eq!(guard.gateway.snapshot().players.len(), 1);
        drop(rx_slow);
    }

    #[tokio::test]
    async fn dropped_client_cannot_rejoin_on_the_same_connection() {
        let state = make_state();
        let (a, _rx_a) = connect(&state).await;
        let (tx, _rx_slow) = mpsc::channel(1);
        let slow = register_client(&state, tx).await;

        let slow_join = r#"{"type":"join","name":"Slow"}"#;
        assert!(!handle_client_message(&state, &slow, slow_join).await);
        assert!(handle_client_message(&state, &a, r#"{"type":"join","name":"A"}"#).await);
        assert!(!handle_client_message(&state, &slow, slow_join).await);

        let guard = state.lock().await;
        assert!(!guard.clients.contains_key(&slow));
        assert_eq!(guard.gateway.snapshot().players.len(), 1);
        assert_eq!(guard.gateway.phase(), RoundPhase::Waiting);
    }

    /// Shortest sequence of `direction` values leading the player to the exit.
    async fn route_to_exit(state: &SharedState, player_id: &str) -> Vec<&'static str> {
        let guard = state.lock().await;
        let world = guard.gateway.lifecycle().world();
        let maze = &world.maze;
        let from = world
            .player(player_id)
            .map(|p| p.position)
            .expect("player should be registered");

        let mut came_from: HashMap<Position, (Position, Direction)> = HashMap::new();
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for dir in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
                let next = current.step(dir);
                if maze.is_open(next) && seen.insert(next) {
                    came_from.insert(next, (current, dir));
                    queue.push_back(next);
                }
            }
        }

        let mut route = Vec::new();
        let mut cursor = maze.exit;
        while let Some((prev, dir)) = came_from.get(&cursor) {
            route.push(match dir {
                Direction::Up => "up",
                Direction::Down => "down",
                Direction::Left => "left",
                Direction::Right => "right",
            });
            cursor = *prev;
        }
        route.reverse();
        route
    }

    #[tokio::test(start_paused = true)]
    async fn win_reset_timer_starts_next_round_after_ten_seconds() {
        let state = make_state();
        let (a, mut rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;

        handle_client_message(&state, &a, r#"{"type":"join","name":"A"}"#).await;
        handle_client_message(&state, &b, r#"{"type":"join","name":"B"}"#).await;
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        let route = route_to_exit(&state, &a).await;
        assert!(!route.is_empty());
        let mut last = Vec::new();
        for direction in route {
            let raw = json!({ "type": "move", "direction": direction }).to_string();
            assert!(handle_client_message(&state, &a, &raw).await);
            last = drain(&mut rx_a);
            drain(&mut rx_b);
        }

        assert_eq!(last[0]["type"], "roundWon");
        assert_eq!(last[0]["player"]["id"], a.as_str());
        assert_eq!(last[1]["state"]["roundActive"], false);
        let won_maze = last[1]["state"]["maze"].clone();

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert!(drain(&mut rx_a).is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        for rx in [&mut rx_a, &mut rx_b] {
            let messages = drain(rx);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0]["type"], "stateUpdate");
            assert_eq!(messages[0]["state"]["roundActive"], true);
            assert_eq!(messages[0]["state"]["roundId"], 2);
            assert_ne!(messages[0]["state"]["maze"], won_maze);
        }
    }

    #[test]
    fn args_build_a_valid_default_config() {
        let args = Args::parse_from(["server"]);
        let config = args.game_config().expect("defaults should be valid");
        assert_eq!(config, GameConfig::default());
    }

    #[test]
    fn args_reject_even_maze_width() {
        let args = Args::parse_from(["server", "--maze-width", "20"]);
        assert!(args.game_config().is_err());
    }
}
