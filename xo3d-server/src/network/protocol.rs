//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::game::board::{Board, Coord, Mark};
use crate::game::error::GameError;
use crate::game::session::{ConnectionId, Outcome, Player, Session};
use crate::game::win::WinningLine;

/// Room identifier: 8 hex characters.
pub type RoomId = String;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a new room and take its first seat.
    CreateRoom(CreateRoomRequest),

    /// Take the free seat in an existing room.
    JoinGame(JoinRequest),

    /// Place a mark.
    MakeMove(MoveRequest),

    /// Vote to reset the room's match.
    RestartGame {
        /// Target room id.
        room: RoomId,
    },

    /// Stop the match now and settle the result.
    EndGame {
        /// Target room id.
        room: RoomId,
    },

    /// Give up the seat in a room.
    PlayerLeft {
        /// Room to leave.
        room: RoomId,
    },

    /// Ask for the room directory.
    GetRooms,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Room creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    /// Room display name, unique among live rooms (case-insensitive).
    pub room_name: String,
    /// Creator's display name.
    #[serde(default)]
    pub player_name: Option<String>,
    /// Optional join password.
    #[serde(default)]
    pub password: Option<String>,
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Target room id.
    pub room: RoomId,
    /// Joiner's display name.
    #[serde(default)]
    pub player_name: Option<String>,
    /// Password, if the room has one.
    #[serde(default)]
    pub password: Option<String>,
}

/// Move request. Coordinates are validated by the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Target room id.
    pub room: RoomId,
    /// X coordinate.
    pub x: i64,
    /// Y coordinate.
    pub y: i64,
    /// Z coordinate.
    pub z: i64,
}

impl MoveRequest {
    /// Target cell. Out-of-range input stays out of range.
    pub fn coord(&self) -> Coord {
        Coord::saturating_from(self.x, self.y, self.z)
    }
}

/// Name used when a client leaves `player_name` out.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting with the identity issued to this connection.
    Connected {
        /// Greeting text.
        message: String,
        /// Identity issued to this connection.
        sid: ConnectionId,
    },

    /// Direct reply to `create_room`.
    RoomCreated {
        /// Id of the new room.
        room_id: RoomId,
    },

    /// Direct reply to a successful `join_game`.
    Joined {
        /// Id of the joined room.
        room_id: RoomId,
    },

    /// Room-wide state snapshot.
    GameState(GameSnapshot),

    /// Room directory, sent to every connected client.
    RoomsUpdate {
        /// Live rooms in creation order.
        rooms: Vec<RoomSummary>,
    },

    /// Direct reply to a restart vote.
    RestartAck(RestartAck),

    /// Error, sent to the originating client only.
    Error(ServerError),

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server wall clock, milliseconds since the epoch.
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Why the server is stopping.
        reason: String,
    },
}

/// Why a snapshot was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Room created.
    Created,
    /// Second player seated.
    Joined,
    /// A mark was placed.
    Moved,
    /// A restart vote was recorded.
    RestartVote,
    /// Both players voted and the match was reset.
    Restarted,
    /// Match ended manually.
    Ended,
    /// A player left or disconnected.
    PlayerLeft,
}

/// Public view of a seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Connection id.
    pub id: ConnectionId,
    /// Symbol.
    pub symbol: Mark,
    /// Display name.
    pub name: String,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id,
            symbol: p.symbol,
            name: p.name.clone(),
        }
    }
}

/// Who left, embedded in departure snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartedPlayer {
    /// Display name.
    pub name: String,
    /// Symbol they played.
    pub symbol: Mark,
}

/// Full room state as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Why this snapshot was sent.
    pub kind: SnapshotKind,
    /// The cube.
    pub board: Board,
    /// Seated players in seat order.
    pub players: Vec<PlayerInfo>,
    /// Symbol to move, if that seat is filled.
    pub current_player: Option<Mark>,
    /// Final result, or `disconnect` in departure snapshots.
    pub winner: Option<Outcome>,
    /// Most recent line scored.
    pub winning_line: Option<WinningLine>,
    /// Lines scored by X.
    pub winning_lines_x: Vec<WinningLine>,
    /// Lines scored by O.
    pub winning_lines_o: Vec<WinningLine>,
    /// X's line count.
    pub score_x: u32,
    /// O's line count.
    pub score_o: u32,
    /// Whether the match has a final result.
    pub is_game_over: bool,
    /// Connections that voted to restart.
    pub ready_players: Vec<ConnectionId>,
    /// Who left (departure snapshots only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub disconnected_player: Option<DepartedPlayer>,
}

impl GameSnapshot {
    /// Capture a session.
    pub fn capture(session: &Session, kind: SnapshotKind) -> Self {
        Self {
            kind,
            board: session.board().clone(),
            players: session.players().iter().map(PlayerInfo::from).collect(),
            current_player: session.current_player().map(|p| p.symbol),
            winner: session.winner(),
            winning_line: session.last_winning_line().copied(),
            winning_lines_x: session.winning_lines(Mark::X).to_vec(),
            winning_lines_o: session.winning_lines(Mark::O).to_vec(),
            score_x: session.score(Mark::X),
            score_o: session.score(Mark::O),
            is_game_over: session.is_over(),
            ready_players: session.ready_players().copied().collect(),
            disconnected_player: None,
        }
    }

    /// Capture a session after `departed` left it.
    pub fn departure(session: &Session, departed: &Player) -> Self {
        Self {
            winner: Some(Outcome::Disconnect),
            winning_line: None,
            disconnected_player: Some(DepartedPlayer {
                name: departed.name.clone(),
                symbol: departed.symbol,
            }),
            ..Self::capture(session, SnapshotKind::PlayerLeft)
        }
    }
}

/// One entry of the room directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    /// Room id.
    pub id: RoomId,
    /// Room display name.
    pub name: String,
    /// Creator's display name.
    pub creator: String,
    /// Seats filled.
    pub players: usize,
    /// Whether joining needs a password.
    pub has_password: bool,
}

/// Direct reply to a restart vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartAck {
    /// Votes collected (empty once the restart happened).
    pub ready_players: Vec<ConnectionId>,
    /// Whether this vote triggered the restart.
    pub all_ready: bool,
    /// Symbol that moves first, when restarted.
    pub current_player: Option<Mark>,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error reply.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<GameError> for ServerError {
    fn from(e: GameError) -> Self {
        Self {
            code: ErrorCode::from(e),
            message: e.to_string(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Room not found.
    GameNotFound,
    /// Both seats taken.
    RoomFull,
    /// Password mismatch.
    WrongPassword,
    /// Name in use in the room.
    NameTaken,
    /// Room name in use.
    DuplicateRoomName,
    /// Connection already seated.
    AlreadySeated,
    /// Needs two players.
    OpponentMissing,
    /// Not the caller's turn.
    NotYourTurn,
    /// Cell already marked.
    CellOccupied,
    /// Match finished.
    GameOver,
    /// Caller not seated.
    PlayerNotSeated,
    /// Coordinate outside the cube.
    OutOfRange,
    /// Undecodable message.
    InvalidInput,
    /// Server overloaded.
    ServerOverloaded,
}

impl From<GameError> for ErrorCode {
    fn from(e: GameError) -> Self {
        match e {
            GameError::GameNotFound => ErrorCode::GameNotFound,
            GameError::RoomFull => ErrorCode::RoomFull,
            GameError::WrongPassword => ErrorCode::WrongPassword,
            GameError::NameTaken => ErrorCode::NameTaken,
            GameError::DuplicateRoomName => ErrorCode::DuplicateRoomName,
            GameError::AlreadySeated => ErrorCode::AlreadySeated,
            GameError::OpponentMissing => ErrorCode::OpponentMissing,
            GameError::NotYourTurn => ErrorCode::NotYourTurn,
            GameError::CellOccupied => ErrorCode::CellOccupied,
            GameError::GameOver => ErrorCode::GameOver,
            GameError::PlayerNotSeated => ErrorCode::PlayerNotSeated,
            GameError::OutOfRange => ErrorCode::OutOfRange,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
