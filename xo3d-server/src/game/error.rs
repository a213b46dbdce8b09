//! Game Errors
//!
//! Every way a room operation can be rejected. A rejected operation
//! never mutates the session it was aimed at.

/// Errors raised by the board, the session state machine and the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// No live room has the requested id.
    #[error("Game not found")]
    GameNotFound,

    /// Both seats are taken.
    #[error("Room is full")]
    RoomFull,

    /// Room password did not match.
    #[error("Wrong password")]
    WrongPassword,

    /// A seated player already uses this name (case-insensitive).
    #[error("A player with this name is already in the room")]
    NameTaken,

    /// A live room already uses this name (case-insensitive).
    #[error("A room with this name already exists")]
    DuplicateRoomName,

    /// The connection already holds a seat in this room.
    #[error("Already seated in this room")]
    AlreadySeated,

    /// The operation needs two seated players.
    #[error("Waiting for opponent")]
    OpponentMissing,

    /// The caller is not the player to move.
    #[error("Not your turn")]
    NotYourTurn,

    /// Target cell already holds a mark.
    #[error("Cell already taken")]
    CellOccupied,

    /// The match has finished; only a restart vote can reopen it.
    #[error("Game already over")]
    GameOver,

    /// The caller holds no seat in this room.
    #[error("Player not in game")]
    PlayerNotSeated,

    /// A coordinate component is outside 0..=2.
    #[error("Coordinate out of range")]
    OutOfRange,
}
