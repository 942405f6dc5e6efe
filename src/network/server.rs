//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Routes client messages to room actors and relays room broadcasts back.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::game::command::Command;
use crate::game::layouts;
use crate::game::state::PlayerId;
use crate::network::protocol::{ClientMessage, ErrorCode, ProtocolError, ServerMessage};
use crate::network::registry::RoomRegistry;
use crate::network::room::{RoomConfig, RoomError, RoomHandle};
use crate::network::store::{InMemoryStore, RoomStore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close a connection after this long without a message.
    pub idle_timeout: Duration,
    /// How often abandoned rooms are swept.
    pub cleanup_interval: Duration,
    /// Course used when `start-game` names none.
    pub default_board: String,
    /// Settings for every room.
    pub room: RoomConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            default_board: layouts::DEFAULT_LAYOUT.to_string(),
            room: RoomConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `ROBORACE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            room: RoomConfig::from_env(),
            ..Self::default()
        };

        if let Ok(addr) = std::env::var("ROBORACE_BIND_ADDR") {
            match addr.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!(%addr, error = %e, "ignoring invalid bind address"),
            }
        }
        if let Ok(max) = std::env::var("ROBORACE_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(max) => config.max_connections = max,
                Err(e) => warn!(%max, error = %e, "ignoring invalid connection limit"),
            }
        }
        if let Ok(secs) = std::env::var("ROBORACE_IDLE_SECS") {
            match secs.parse() {
                Ok(secs) => config.idle_timeout = Duration::from_secs(secs),
                Err(e) => warn!(%secs, error = %e, "ignoring invalid idle timeout"),
            }
        }
        if let Ok(board) = std::env::var("ROBORACE_BOARD") {
            if layouts::by_name(&board).is_some() {
                config.default_board = board;
            } else {
                warn!(%board, "unknown board, keeping {}", config.default_board);
            }
        }

        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Room error.
    #[error("Room error: {0}")]
    Room(#[from] RoomError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Seated player, once in a room.
    player_id: Option<PlayerId>,
    /// Room the player sits in.
    room: Option<RoomHandle>,
    /// Task relaying room broadcasts to this client.
    forwarder: Option<JoinHandle<()>>,
    /// Connection time.
    connected_at: Instant,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Live rooms.
    registry: Arc<RoomRegistry>,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

async fn send_error(sender: &mpsc::Sender<ServerMessage>, code: ErrorCode, message: impl Into<String>) {
    let _ = sender.send(ServerMessage::error(code, message)).await;
}

/// Relay room broadcasts to one client until either side goes away.
fn spawn_forwarder(
    room: RoomHandle,
    mut updates: broadcast::Receiver<ServerMessage>,
    sender: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = match updates.recv().await {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(room = %room.code(), skipped, "client lagged, resending state");
                    match room.state().await {
                        Ok(update) => ServerMessage::State(update),
                        Err(_) => break,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    })
}

impl GameServer {
    /// Create a new game server with in-memory snapshots.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    /// Create a new game server persisting rooms to `store`.
    pub fn with_store(config: ServerConfig, store: Arc<dyn RoomStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(RoomRegistry::new(config.room.clone(), store));

        Self {
            config,
            registry,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(version = %self.config.version, "Game server listening on {}", listener.local_addr()?);

        let cleanup_registry = self.registry.clone();
        let cleanup_every = self.config.cleanup_interval;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_registry, cleanup_every).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("{}, rejecting {}", GameServerError::ConnectionLimitReached, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player_id: None,
                    room: None,
                    forwarder: None,
                    connected_at: Instant::now(),
                });
            }

            // Spawn message sender task; state updates get a binary digest
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let digest = match &msg {
                        ServerMessage::State(update) => update.digest(),
                        _ => None,
                    };
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                    if let Some(digest) = digest {
                        match digest.to_bytes() {
                            Ok(bytes) => {
                                if ws_sender.send(Message::Binary(bytes)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => error!("Failed to encode digest: {}", e),
                        }
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        send_error(&msg_tx, ErrorCode::InvalidInput, format!("Invalid message format: {e}")).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &registry,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                send_error(&msg_tx, ErrorCode::InvalidInput, "Binary frames are not accepted").await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = tokio::time::sleep(config.idle_timeout) => {
                        info!("Client {} idle, closing", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            Self::handle_leave(addr, &clients).await;
            let connected_for = clients
                .write()
                .await
                .remove(&addr)
                .map(|client| client.connected_at.elapsed())
                .unwrap_or_default();

            // Let queued messages drain before the socket closes
            drop(msg_tx);
            if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Sender for {} did not drain in time", addr);
            }

            info!("Client {} cleaned up after {:?}", addr, connected_for);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Clients,
        registry: &Arc<RoomRegistry>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        debug!(client = %addr, message = msg.name(), "client message");
        match msg {
            ClientMessage::CreateRoom { name, player_id } => {
                Self::handle_create(addr, name, player_id, clients, registry, sender).await;
            }
            ClientMessage::JoinRoom { room_code, name, player_id } => {
                Self::handle_join(addr, room_code, name, player_id, clients, registry, sender).await;
            }
            ClientMessage::StartGame { board } => {
                Self::handle_start(addr, board, clients, config, sender).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis(),
                }).await;
            }
            ClientMessage::Leave => {
                Self::handle_leave(addr, clients).await;
            }
            other => {
                Self::handle_game_command(addr, other, clients, sender).await;
            }
        }
    }

    /// Seat this connection in `room`: subscribe, apply `command`, remember the seat.
    async fn attach(
        addr: SocketAddr,
        room: RoomHandle,
        player_id: PlayerId,
        command: Command,
        clients: &Clients,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> bool {
        // Subscribe first so the state produced by this command reaches us
        let updates = room.subscribe();
        if let Err(e) = room.apply(command).await {
            warn!(client = %addr, room = %room.code(), error = %e, "could not seat player");
            send_error(sender, Self::error_code(&e), e.to_string()).await;
            return false;
        }

        let forwarder = spawn_forwarder(room.clone(), updates, sender.clone());
        let mut clients = clients.write().await;
        match clients.get_mut(&addr) {
            Some(client) => {
                client.player_id = Some(player_id);
                client.room = Some(room);
                client.forwarder = Some(forwarder);
                true
            }
            None => {
                forwarder.abort();
                false
            }
        }
    }

    async fn in_room(addr: SocketAddr, clients: &Clients) -> Option<(PlayerId, RoomHandle)> {
        let clients = clients.read().await;
        let client = clients.get(&addr)?;
        Some((client.player_id?, client.room.clone()?))
    }

    /// Handle room creation.
    async fn handle_create(
        addr: SocketAddr,
        name: String,
        player_id: Option<PlayerId>,
        clients: &Clients,
        registry: &Arc<RoomRegistry>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        if Self::in_room(addr, clients).await.is_some() {
            send_error(sender, ErrorCode::AlreadyInRoom, "Leave the current room first").await;
            return;
        }

        let room = registry.create_room().await;
        let player_id = player_id.unwrap_or_else(PlayerId::random);
        let room_code = room.code().to_string();
        let join = Command::Join { player_id, name };

        if Self::attach(addr, room, player_id, join, clients, sender).await {
            let _ = sender.send(ServerMessage::RoomCreated { room_code, player_id }).await;
        } else {
            registry.close_room(&room_code).await;
        }
    }

    /// Handle joining or rejoining a room.
    async fn handle_join(
        addr: SocketAddr,
        room_code: String,
        name: String,
        player_id: Option<PlayerId>,
        clients: &Clients,
        registry: &Arc<RoomRegistry>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        if Self::in_room(addr, clients).await.is_some() {
            send_error(sender, ErrorCode::AlreadyInRoom, "Leave the current room first").await;
            return;
        }

        let room = match registry.get(&room_code).await {
            Some(room) => room,
            None => match registry.restore_room(&room_code).await {
                Some(room) => room,
                None => {
                    warn!(client = %addr, room = %room_code, "join for unknown room");
                    send_error(sender, ErrorCode::RoomNotFound, format!("No room {room_code}")).await;
                    return;
                }
            },
        };

        // A known id reconnects its seat instead of taking a new one
        let seated = match (player_id, room.state().await) {
            (Some(id), Ok(update)) => update.snapshot.players.iter().any(|p| p.id == id),
            (_, Err(e)) => {
                send_error(sender, ErrorCode::RoomNotFound, e.to_string()).await;
                return;
            }
            _ => false,
        };
        let player_id = player_id.unwrap_or_else(PlayerId::random);
        let command = if seated {
            info!(client = %addr, room = %room.code(), player = %player_id, "player reconnecting");
            Command::SetConnected { player_id, connected: true }
        } else {
            Command::Join { player_id, name }
        };

        let room_code = room.code().to_string();
        if Self::attach(addr, room.clone(), player_id, command, clients, sender).await {
            let _ = sender.send(ServerMessage::Joined { room_code, player_id }).await;
            // A reconnect may not change the game, so send the current state directly
            if seated {
                if let Ok(update) = room.state().await {
                    let _ = sender.send(ServerMessage::State(update)).await;
                }
            }
        }
    }

    /// Handle game start.
    async fn handle_start(
        addr: SocketAddr,
        board: Option<String>,
        clients: &Clients,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((_, room)) = Self::in_room(addr, clients).await else {
            send_error(sender, ErrorCode::NotInRoom, "Join a room first").await;
            return;
        };

        let name = board.unwrap_or_else(|| config.default_board.clone());
        let Some(board) = layouts::by_name(&name) else {
            send_error(sender, ErrorCode::InvalidInput, format!("Unknown board {name}")).await;
            return;
        };

        match room.apply(Command::Start { board }).await {
            Ok(_) => info!(room = %room.code(), board = %name, "game started"),
            Err(e) => {
                warn!(client = %addr, room = %room.code(), error = %e, "start rejected");
                send_error(sender, Self::error_code(&e), e.to_string()).await;
            }
        }
    }

    /// Handle an in-game message.
    async fn handle_game_command(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Clients,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((player_id, room)) = Self::in_room(addr, clients).await else {
            send_error(sender, ErrorCode::NotInRoom, "Join a room first").await;
            return;
        };

        let command = match msg.into_command(player_id) {
            Ok(command) => command,
            Err(e) => {
                warn!(client = %addr, error = %e, "invalid game message");
                let code = match e {
                    ProtocolError::PlayerMismatch { .. } => ErrorCode::PlayerMismatch,
                    ProtocolError::NotAGameCommand(_) => ErrorCode::InvalidInput,
                };
                send_error(sender, code, e.to_string()).await;
                return;
            }
        };

        if let Err(e) = room.apply(command).await {
            send_error(sender, Self::error_code(&e), e.to_string()).await;
        }
    }

    /// Handle player leave or disconnect: release the seat softly.
    async fn handle_leave(addr: SocketAddr, clients: &Clients) {
        let (player_id, room, forwarder) = {
            let mut clients = clients.write().await;
            match clients.get_mut(&addr) {
                Some(c) => (c.player_id.take(), c.room.take(), c.forwarder.take()),
                None => return,
            }
        };

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }

        if let (Some(player_id), Some(room)) = (player_id, room) {
            if let Err(e) = room.apply(Command::SetConnected { player_id, connected: false }).await {
                debug!(room = %room.code(), error = %e, "disconnect not applied");
            }
        }
    }

    fn error_code(error: &RoomError) -> ErrorCode {
        match error {
            RoomError::Closed => ErrorCode::RoomNotFound,
            RoomError::Rejected(_) => ErrorCode::Rejected,
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(registry: Arc<RoomRegistry>, every: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;
            registry.cleanup().await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Phase;
    use crate::network::protocol::StateDigest;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_server() -> (Arc<GameServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, addr)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, msg: &str) {
        ws.send(Message::Text(msg.to_string())).await.unwrap();
    }

    async fn next_frame(ws: &mut Client) -> Message {
        tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for server")
            .expect("connection closed")
            .expect("websocket error")
    }

    /// Skip frames until one matches.
    async fn wait_for(ws: &mut Client, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            if let Message::Text(text) = next_frame(ws).await {
                let msg = ServerMessage::from_json(&text).unwrap();
                if pred(&msg) {
                    return msg;
                }
            }
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(layouts::by_name(&config.default_board).is_some());
        assert_eq!(config.room.programming_timeout, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(ServerConfig::default());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_join_start() {
        let (server, addr) = start_server().await;
        let mut host = connect(addr).await;
        let mut guest = connect(addr).await;

        send(&mut host, r#"{"type":"create-room","name":"ada"}"#).await;
        let ServerMessage::RoomCreated { room_code, .. } =
            wait_for(&mut host, |m| matches!(m, ServerMessage::RoomCreated { .. })).await
        else {
            unreachable!()
        };
        assert_eq!(server.room_count().await, 1);

        let join = format!(r#"{{"type":"join-room","roomCode":"{}","name":"bob"}}"#, room_code.to_lowercase());
        send(&mut guest, &join).await;
        wait_for(&mut guest, |m| matches!(m, ServerMessage::Joined { .. })).await;

        send(&mut host, r#"{"type":"start-game"}"#).await;
        let programming = |m: &ServerMessage| {
            matches!(m, ServerMessage::State(u) if u.snapshot.phase == Phase::Programming)
        };
        wait_for(&mut host, programming).await;
        let ServerMessage::State(update) = wait_for(&mut guest, programming).await else {
            unreachable!()
        };
        assert_eq!(update.snapshot.players.len(), 2);
        assert!(update.deadline.is_some());

        // Every state frame is followed by its binary digest
        let Message::Binary(bytes) = next_frame(&mut guest).await else {
            panic!("expected digest frame");
        };
        let digest = StateDigest::from_bytes(&bytes).unwrap();
        assert_eq!(hex::encode(digest.state_hash), update.state_hash);
        assert_eq!(digest.round, 1);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_player_mismatch_rejected() {
        let (server, addr) = start_server().await;
        let mut ws = connect(addr).await;

        send(&mut ws, r#"{"type":"create-room","name":"ada"}"#).await;
        wait_for(&mut ws, |m| matches!(m, ServerMessage::RoomCreated { .. })).await;

        let other = PlayerId::new([9; 16]);
        let msg = format!(r#"{{"type":"reset-cards","playerId":"{other}"}}"#);
        send(&mut ws, &msg).await;
        let ServerMessage::Error(err) = wait_for(&mut ws, |m| matches!(m, ServerMessage::Error(_))).await else {
            unreachable!()
        };
        assert_eq!(err.code, ErrorCode::PlayerMismatch);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_room_and_bad_json() {
        let (server, addr) = start_server().await;
        let mut ws = connect(addr).await;

        send(&mut ws, r#"{"type":"join-room","roomCode":"NOPE00","name":"ada"}"#).await;
        let ServerMessage::Error(err) = wait_for(&mut ws, |m| matches!(m, ServerMessage::Error(_))).await else {
            unreachable!()
        };
        assert_eq!(err.code, ErrorCode::RoomNotFound);

        send(&mut ws, "not json").await;
        let ServerMessage::Error(err) = wait_for(&mut ws, |m| matches!(m, ServerMessage::Error(_))).await else {
            unreachable!()
        };
        assert_eq!(err.code, ErrorCode::InvalidInput);

        send(&mut ws, r#"{"type":"submit-cards","playerId":"00000000-0000-0000-0000-000000000000","cards":[]}"#).await;
        let ServerMessage::Error(err) = wait_for(&mut ws, |m| matches!(m, ServerMessage::Error(_))).await else {
            unreachable!()
        };
        assert_eq!(err.code, ErrorCode::NotInRoom);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (server, addr) = start_server().await;
        let mut ws = connect(addr).await;

        send(&mut ws, r#"{"type":"ping","timestamp":42}"#).await;
        let ServerMessage::Pong { timestamp, server_time } =
            wait_for(&mut ws, |m| matches!(m, ServerMessage::Pong { .. })).await
        else {
            unreachable!()
        };
        assert_eq!(timestamp, 42);
        assert!(server_time > 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_marks_player() {
        let (server, addr) = start_server().await;
        let mut host = connect(addr).await;
        let mut guest = connect(addr).await;

        send(&mut host, r#"{"type":"create-room","name":"ada"}"#).await;
        let ServerMessage::RoomCreated { room_code, .. } =
            wait_for(&mut host, |m| matches!(m, ServerMessage::RoomCreated { .. })).await
        else {
            unreachable!()
        };
        let join = format!(r#"{{"type":"join-room","roomCode":"{room_code}","name":"bob"}}"#);
        send(&mut guest, &join).await;
        let ServerMessage::Joined { player_id: bob, .. } =
            wait_for(&mut guest, |m| matches!(m, ServerMessage::Joined { .. })).await
        else {
            unreachable!()
        };

        guest.close(None).await.unwrap();
        let gone = |m: &ServerMessage| {
            matches!(m, ServerMessage::State(u)
                if u.snapshot.players.iter().any(|p| p.id == bob && p.is_disconnected))
        };
        wait_for(&mut host, gone).await;

        // Same id reconnects to the same seat
        let mut again = connect(addr).await;
        let rejoin = format!(r#"{{"type":"join-room","roomCode":"{room_code}","name":"bob","playerId":"{bob}"}}"#);
        send(&mut again, &rejoin).await;
        let back = |m: &ServerMessage| {
            matches!(m, ServerMessage::State(u)
                if u.snapshot.players.len() == 2
                    && u.snapshot.players.iter().all(|p| !p.is_disconnected))
        };
        wait_for(&mut again, back).await;

        server.shutdown();
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let running = server.clone();
        let task = tokio::spawn(async move { running.serve(listener).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
