//! Game Logic Module
//!
//! Pure, synchronous rules for 3x3x3 noughts and crosses. Nothing here
//! touches the network or the clock; randomness is injected.
//!
//! ## Module Structure
//!
//! - `board`: Cube grid, marks and coordinates
//! - `win`: Line-of-three detection through the last placed cell
//! - `session`: Per-room state machine (seats, turns, scores, restart votes)
//! - `error`: Rejection reasons shared with the network layer

pub mod board;
pub mod error;
pub mod session;
pub mod win;

// Re-export key types
pub use board::{Board, Coord, Mark, BOARD_SIZE};
pub use error::GameError;
pub use session::{ConnectionId, MoveOutcome, Outcome, Player, RestartOutcome, Session, SessionPhase};
pub use win::{detect, detect_all, WinningLine};
