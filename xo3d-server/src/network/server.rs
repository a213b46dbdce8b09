//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Issues connection identities, routes client requests onto the
//! [`Registry`], and fans the resulting snapshots out to room members.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::error::GameError;
use crate::game::session::{ConnectionId, RestartOutcome};
use crate::network::protocol::{
    ClientMessage, CreateRoomRequest, ErrorCode, GameSnapshot, JoinRequest, MoveRequest,
    RestartAck, ServerError, ServerMessage, SnapshotKind, DEFAULT_PLAYER_NAME,
};
use crate::network::registry::Registry;

/// How long a closing connection may spend flushing queued messages.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue length per connection.
    pub channel_capacity: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_connections: 1000,
            channel_capacity: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from `XO3D_BIND_ADDR`, `XO3D_MAX_CONNECTIONS` and
    /// `XO3D_CHANNEL_CAPACITY`. Unset or invalid values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            bind_addr: parse_or(&lookup, "XO3D_BIND_ADDR", defaults.bind_addr),
            max_connections: parse_or(&lookup, "XO3D_MAX_CONNECTIONS", defaults.max_connections),
            channel_capacity: parse_or(&lookup, "XO3D_CHANNEL_CAPACITY", defaults.channel_capacity)
                .max(1),
            version: defaults.version,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using {:?}", key, raw, default);
            default
        }),
        None => default,
    }
}

// =============================================================================
// ERRORS
// =============================================================================

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

    /// Outbound message could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

fn encode(message: &ServerMessage) -> Result<Message, GameServerError> {
    Ok(Message::Text(message.to_json()?))
}

/// Queue a message for one connection without waiting.
fn reply(sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    if let Err(e) = sender.try_send(message) {
        debug!("Dropped direct message: {}", e);
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// HUB
// =============================================================================

/// Connected client state.
struct ConnectedClient {
    /// Outbound queue, used for directory broadcasts.
    sender: mpsc::Sender<ServerMessage>,
    /// Connection time.
    connected_at: Instant,
}

/// Transport-independent request handling.
///
/// Every client request enters through [`Hub::dispatch`]; replies and
/// broadcasts leave through the connections' outbound channels.
pub struct Hub {
    registry: Arc<Registry>,
    clients: RwLock<BTreeMap<ConnectionId, ConnectedClient>>,
    rng: Mutex<StdRng>,
}

impl Hub {
    /// Create a hub over `registry`, drawing restart seats from `rng`.
    pub fn new(registry: Arc<Registry>, rng: StdRng) -> Self {
        Self {
            registry,
            clients: RwLock::new(BTreeMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Admit a connection and greet it with its identity.
    pub async fn connect(
        &self,
        sender: mpsc::Sender<ServerMessage>,
        max_connections: usize,
    ) -> Result<ConnectionId, GameServerError> {
        let mut clients = self.clients.write().await;
        if clients.len() >= max_connections {
            return Err(GameServerError::ConnectionLimitReached);
        }

        let id = ConnectionId::random();
        reply(
            &sender,
            ServerMessage::Connected {
                message: "Connected to server".to_string(),
                sid: id,
            },
        );
        clients.insert(
            id,
            ConnectedClient {
                sender,
                connected_at: Instant::now(),
            },
        );

        info!("Client {} connected ({} total)", id, clients.len());
        Ok(id)
    }

    /// Drop a connection and vacate every seat it held.
    pub async fn disconnect(&self, id: ConnectionId) {
        let client = self.clients.write().await.remove(&id);

        let mut vacated = false;
        for (room_id, handle) in self.registry.rooms_with_member(&id).await {
            let departed = handle.write().await.depart(&id);
            if departed.is_some() {
                self.registry.remove_if_empty(&room_id).await;
                vacated = true;
            }
        }
        if vacated {
            self.broadcast_rooms().await;
        }

        if let Some(client) = client {
            info!(
                "Client {} disconnected after {:?}",
                id,
                client.connected_at.elapsed()
            );
        }
    }

    /// Decode a text frame and dispatch it.
    pub async fn handle_text(&self, id: ConnectionId, text: &str, sender: &mpsc::Sender<ServerMessage>) {
        match ClientMessage::from_json(text) {
            Ok(msg) => self.dispatch(id, msg, sender).await,
            Err(e) => {
                debug!("Invalid message from {}: {}", id, e);
                reply(
                    sender,
                    ServerMessage::Error(ServerError::new(
                        ErrorCode::InvalidInput,
                        "Invalid message format",
                    )),
                );
            }
        }
    }

    /// Handle one client request. Rejections go back to `sender` only.
    pub async fn dispatch(&self, id: ConnectionId, msg: ClientMessage, sender: &mpsc::Sender<ServerMessage>) {
        let result = match msg {
            ClientMessage::CreateRoom(req) => self.handle_create(id, req, sender).await,
            ClientMessage::JoinGame(req) => self.handle_join(id, req, sender).await,
            ClientMessage::MakeMove(req) => self.handle_move(id, req).await,
            ClientMessage::RestartGame { room } => self.handle_restart(id, &room, sender).await,
            ClientMessage::EndGame { room } => self.handle_end(id, &room).await,
            ClientMessage::PlayerLeft { room } => {
                self.handle_leave(id, &room).await;
                Ok(())
            }
            ClientMessage::GetRooms => {
                let rooms = self.registry.list().await;
                reply(sender, ServerMessage::RoomsUpdate { rooms });
                Ok(())
            }
            ClientMessage::Ping { timestamp } => {
                reply(
                    sender,
                    ServerMessage::Pong {
                        timestamp,
                        server_time: now_millis(),
                    },
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!("Rejected request from {}: {}", id, e);
            reply(sender, ServerMessage::Error(e.into()));
        }
    }

    async fn handle_create(
        &self,
        id: ConnectionId,
        req: CreateRoomRequest,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), GameError> {
        let player_name = req.player_name.unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string());
        let (room_id, handle) = self
            .registry
            .create(&req.room_name, id, &player_name, req.password, sender.clone())
            .await?;

        reply(sender, ServerMessage::RoomCreated { room_id });
        {
            let room = handle.read().await;
            let snapshot = GameSnapshot::capture(room.session(), SnapshotKind::Created);
            room.broadcast(&ServerMessage::GameState(snapshot));
        }

        self.broadcast_rooms().await;
        Ok(())
    }

    async fn handle_join(
        &self,
        id: ConnectionId,
        req: JoinRequest,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), GameError> {
        let player_name = req.player_name.as_deref().unwrap_or(DEFAULT_PLAYER_NAME);
        self.registry
            .join(&req.room, id, player_name, req.password.as_deref(), sender.clone())
            .await?;

        reply(sender, ServerMessage::Joined { room_id: req.room });
        self.broadcast_rooms().await;
        Ok(())
    }

    async fn handle_move(&self, id: ConnectionId, req: MoveRequest) -> Result<(), GameError> {
        let handle = self.registry.get(&req.room).await?;
        let mut room = handle.write().await;

        let outcome = room.session_mut().make_move(id, req.coord())?;
        debug!(
            "{:?} played {:?} in room {} ({} line(s))",
            outcome.mark,
            outcome.at,
            req.room,
            outcome.scored.len()
        );

        let snapshot = GameSnapshot::capture(room.session(), SnapshotKind::Moved);
        room.broadcast(&ServerMessage::GameState(snapshot));
        Ok(())
    }

    async fn handle_restart(
        &self,
        id: ConnectionId,
        room_id: &str,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), GameError> {
        let handle = self.registry.get(room_id).await?;
        let mut room = handle.write().await;

        let outcome = {
            let mut rng = self.rng.lock().await;
            room.session_mut().vote_restart(id, &mut *rng)?
        };

        let (kind, ack) = match outcome {
            RestartOutcome::Waiting { ready } => {
                debug!("Restart votes in room {}: {}/2", room_id, ready);
                (
                    SnapshotKind::RestartVote,
                    RestartAck {
                        ready_players: room.session().ready_players().copied().collect(),
                        all_ready: false,
                        current_player: None,
                    },
                )
            }
            RestartOutcome::Restarted { first } => (
                SnapshotKind::Restarted,
                RestartAck {
                    ready_players: Vec::new(),
                    all_ready: true,
                    current_player: Some(first),
                },
            ),
        };

        let snapshot = GameSnapshot::capture(room.session(), kind);
        room.broadcast(&ServerMessage::GameState(snapshot));
        reply(sender, ServerMessage::RestartAck(ack));
        Ok(())
    }

    async fn handle_end(&self, id: ConnectionId, room_id: &str) -> Result<(), GameError> {
        let handle = self.registry.get(room_id).await?;
        let mut room = handle.write().await;

        let outcome = room.session_mut().end_game()?;
        debug!("{} ended room {} with {:?}", id, room_id, outcome);

        let snapshot = GameSnapshot::capture(room.session(), SnapshotKind::Ended);
        room.broadcast(&ServerMessage::GameState(snapshot));
        Ok(())
    }

    /// Leaving an unknown room, or one without a seat, is a no-op.
    async fn handle_leave(&self, id: ConnectionId, room_id: &str) {
        let Ok(handle) = self.registry.get(room_id).await else {
            return;
        };
        let departed = handle.write().await.depart(&id);
        if departed.is_some() {
            self.registry.remove_if_empty(room_id).await;
            self.broadcast_rooms().await;
        }
    }

    /// Send the room directory to every connected client.
    async fn broadcast_rooms(&self) {
        let message = ServerMessage::RoomsUpdate {
            rooms: self.registry.list().await,
        };
        let clients = self.clients.read().await;
        for client in clients.values() {
            reply(&client.sender, message.clone());
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Request handling shared by all connections.
    hub: Arc<Hub>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            hub: Arc::new(Hub::new(Arc::new(Registry::new()), StdRng::from_entropy())),
            shutdown_tx,
        }
    }

    /// Run the server until [`GameServer::shutdown`] is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            "xo3d server v{} listening on {}",
            self.config.version, self.config.bind_addr
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
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

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = Arc::clone(&self.hub);
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            match Self::serve_connection(hub, stream, addr, config, shutdown_rx).await {
                Ok(()) => debug!("Connection {} closed", addr),
                Err(GameServerError::ConnectionLimitReached) => {
                    warn!("Connection limit reached, rejected {}", addr)
                }
                Err(e) => error!("Connection {} failed: {}", addr, e),
            }
        });
    }

    async fn serve_connection(
        hub: Arc<Hub>,
        stream: TcpStream,
        addr: SocketAddr,
        config: ServerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.channel_capacity);

        let connection_id = match hub.connect(msg_tx.clone(), config.max_connections).await {
            Ok(id) => id,
            Err(e) => {
                let refusal = ServerMessage::Error(ServerError::new(
                    ErrorCode::ServerOverloaded,
                    e.to_string(),
                ));
                ws_sender.send(encode(&refusal)?).await?;
                ws_sender.close().await?;
                return Err(e);
            }
        };
        debug!("Connection {} is client {}", addr, connection_id);

        // Spawn message sender task
        let mut sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let frame = match encode(&msg) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        loop {
            tokio::select! {
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            hub.handle_text(connection_id, &text, &msg_tx).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            reply(&msg_tx, ServerMessage::Error(ServerError::new(
                                ErrorCode::InvalidInput,
                                "Binary frames are not supported",
                            )));
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", connection_id);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", connection_id, e);
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    reply(&msg_tx, ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    });
                    break;
                }
            }
        }

        // Cleanup
        hub.disconnect(connection_id).await;
        drop(msg_tx);
        if timeout(FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
            sender_task.abort();
        }

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.hub.connection_count().await
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.hub.registry().room_count().await
    }
}
