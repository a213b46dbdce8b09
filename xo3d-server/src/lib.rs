//! # xo3d Game Server
//!
//! Room and session server for two-player noughts and crosses on a 3x3x3 cube.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       XO3D SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Rules (pure, synchronous)                 │
//! │  ├── board.rs    - 3x3x3 grid, marks, coordinates            │
//! │  ├── win.rs      - Line detection along 13 directions        │
//! │  ├── session.rs  - Seats, turns, scores, restart votes       │
//! │  └── error.rs    - Rejection reasons                         │
//! │                                                              │
//! │  network/        - Networking (async)                        │
//! │  ├── server.rs   - WebSocket server and request dispatch     │
//! │  ├── registry.rs - Live rooms and per-room locks             │
//! │  └── protocol.rs - Message types                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scoring
//!
//! A match does not stop at the first line. Every line of three a move
//! completes is scored, and the match ends when the board is full (or a
//! player ends it). The higher line count wins; equal counts draw.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Board, Coord, Mark};
pub use game::error::GameError;
pub use game::session::{ConnectionId, Session};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
