//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! All rule decisions are delegated to `game/`; this layer only routes
//! requests, holds room locks and delivers messages.

pub mod protocol;
pub mod registry;
pub mod server;

pub use protocol::{
    ClientMessage, ErrorCode, GameSnapshot, RoomId, RoomSummary, ServerError, ServerMessage,
    SnapshotKind,
};
pub use registry::{Registry, Room, RoomHandle};
pub use server::{GameServer, GameServerError, Hub, ServerConfig};
