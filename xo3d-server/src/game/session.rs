//! Room Session State Machine
//!
//! One room's complete game state: board, seats, turn pointer, line scores
//! and restart votes. Pure and synchronous; the network layer serializes
//! access with a per-room lock and turns results into broadcasts.
//!
//! ```text
//!   create ──► WaitingForOpponent ──join──► InProgress ──board full / end──► Over
//!                    ▲                          │                             │
//!                    └──────── leave ───────────┘◄──── both vote restart ─────┘
//! ```

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::game::board::{Board, Coord, Mark};
use crate::game::error::GameError;
use crate::game::win::{detect_all, WinningLine};

/// Seats per room.
pub const MAX_PLAYERS: usize = 2;

// =============================================================================
// IDENTITIES
// =============================================================================

/// Opaque identity of a client connection, issued by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub uuid::Uuid);

impl ConnectionId {
    /// Issue a fresh random identity.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A seated player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Connection holding the seat.
    pub id: ConnectionId,
    /// Symbol this player places.
    pub symbol: Mark,
    /// Display name, unique within the room (case-insensitive).
    pub name: String,
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Final result of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// X scored more lines.
    X,
    /// O scored more lines.
    O,
    /// Equal line counts.
    #[serde(rename = "draw")]
    Draw,
    /// The opponent left. Only ever sent in departure snapshots.
    #[serde(rename = "disconnect")]
    Disconnect,
}

impl Outcome {
    /// Compare line counts: higher wins, equal is a draw.
    pub fn from_scores(score_x: u32, score_o: u32) -> Self {
        match score_x.cmp(&score_o) {
            std::cmp::Ordering::Greater => Outcome::X,
            std::cmp::Ordering::Less => Outcome::O,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

/// Coarse lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Fewer than two seats filled.
    WaitingForOpponent,
    /// Both seats filled and the match is running.
    InProgress,
    /// The match has a final result.
    Over,
}

/// Result of a successful move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Symbol placed.
    pub mark: Mark,
    /// Cell written.
    pub at: Coord,
    /// Lines completed by this move (possibly several).
    pub scored: Vec<WinningLine>,
    /// Set when this move filled the board.
    pub finished: Option<Outcome>,
}

/// Result of a restart vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Vote recorded; waiting for the other seat.
    Waiting {
        /// Votes collected so far.
        ready: usize,
    },
    /// Both seats voted and the match was reset.
    Restarted {
        /// Symbol that moves first.
        first: Mark,
    },
}

// =============================================================================
// SESSION
// =============================================================================

/// Game state of one room.
#[derive(Debug, Clone)]
pub struct Session {
    board: Board,
    players: Vec<Player>,
    current_player_index: usize,
    room_name: String,
    creator_name: String,
    password: Option<String>,
    winner: Option<Outcome>,
    last_winning_line: Option<WinningLine>,
    winning_lines_x: Vec<WinningLine>,
    winning_lines_o: Vec<WinningLine>,
    score_x: u32,
    score_o: u32,
    ready: BTreeSet<ConnectionId>,
    is_over: bool,
}

impl Session {
    /// Open a room with its creator seated as `X`.
    ///
    /// An empty password is treated as no password.
    pub fn new(
        room_name: impl Into<String>,
        creator_id: ConnectionId,
        creator_name: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        let creator_name = creator_name.into();
        Self {
            board: Board::new(),
            players: vec![Player {
                id: creator_id,
                symbol: Mark::X,
                name: creator_name.clone(),
            }],
            current_player_index: 0,
            room_name: room_name.into(),
            creator_name,
            password: password.filter(|p| !p.is_empty()),
            winner: None,
            last_winning_line: None,
            winning_lines_x: Vec::new(),
            winning_lines_o: Vec::new(),
            score_x: 0,
            score_o: 0,
            ready: BTreeSet::new(),
            is_over: false,
        }
    }

    /// Seat a second player.
    pub fn join(
        &mut self,
        id: ConnectionId,
        name: &str,
        password: Option<&str>,
    ) -> Result<&Player, GameError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::RoomFull);
        }
        if self.is_seated(&id) {
            return Err(GameError::AlreadySeated);
        }
        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Err(GameError::WrongPassword);
            }
        }
        let lowered = name.to_lowercase();
        if self.players.iter().any(|p| p.name.to_lowercase() == lowered) {
            return Err(GameError::NameTaken);
        }

        let symbol = self
            .players
            .first()
            .map(|p| p.symbol.opponent())
            .unwrap_or(Mark::X);
        self.players.push(Player {
            id,
            symbol,
            name: name.to_string(),
        });

        info!("{} joined room {:?} as {:?}", name, self.room_name, symbol);
        Ok(&self.players[self.players.len() - 1])
    }

    /// Place the current player's mark and score any completed lines.
    pub fn make_move(&mut self, id: ConnectionId, at: Coord) -> Result<MoveOutcome, GameError> {
        if self.players.len() < MAX_PLAYERS {
            return Err(GameError::OpponentMissing);
        }
        let mover = &self.players[self.current_player_index];
        if mover.id != id {
            return Err(GameError::NotYourTurn);
        }
        if self.board.get(at)?.is_some() {
            return Err(GameError::CellOccupied);
        }
        if self.is_over {
            return Err(GameError::GameOver);
        }

        let mark = mover.symbol;
        self.board.set(at, Some(mark))?;

        let scored = detect_all(&self.board, at);
        if let Some(first) = scored.first() {
            self.last_winning_line = Some(*first);
            for line in &scored {
                self.record_line(mark, *line);
            }
            info!(
                "{:?} completed {} line(s) in room {:?}; score X={} O={}",
                mark,
                scored.len(),
                self.room_name,
                self.score_x,
                self.score_o
            );
        }

        let finished = if self.board.is_full() {
            let outcome = Outcome::from_scores(self.score_x, self.score_o);
            self.winner = Some(outcome);
            self.is_over = true;
            info!("Board full in room {:?}, result {:?}", self.room_name, outcome);
            Some(outcome)
        } else {
            None
        };

        self.current_player_index = (self.current_player_index + 1) % MAX_PLAYERS;

        Ok(MoveOutcome {
            mark,
            at,
            scored,
            finished,
        })
    }

    /// Record a restart vote; reset the match once both seats agree.
    pub fn vote_restart<R: Rng + ?Sized>(
        &mut self,
        id: ConnectionId,
        rng: &mut R,
    ) -> Result<RestartOutcome, GameError> {
        if !self.is_seated(&id) {
            return Err(GameError::PlayerNotSeated);
        }

        self.ready.insert(id);
        let all_ready = self.players.len() == MAX_PLAYERS
            && self.players.iter().all(|p| self.ready.contains(&p.id));

        if !all_ready {
            return Ok(RestartOutcome::Waiting {
                ready: self.ready.len(),
            });
        }

        self.board.reset();
        self.current_player_index = rng.gen_range(0..MAX_PLAYERS);
        self.winner = None;
        self.last_winning_line = None;
        self.winning_lines_x.clear();
        self.winning_lines_o.clear();
        self.score_x = 0;
        self.score_o = 0;
        self.is_over = false;
        self.ready.clear();

        let first = self.players[self.current_player_index].symbol;
        info!("Room {:?} restarted, {:?} moves first", self.room_name, first);
        Ok(RestartOutcome::Restarted { first })
    }

    /// Stop the match now and settle the result from the current scores.
    pub fn end_game(&mut self) -> Result<Outcome, GameError> {
        if self.players.len() < MAX_PLAYERS {
            return Err(GameError::OpponentMissing);
        }

        self.reconcile_scores();
        let outcome = Outcome::from_scores(self.score_x, self.score_o);
        self.is_over = true;
        self.winner = Some(outcome);

        info!(
            "Room {:?} ended manually: X={} O={} result {:?}",
            self.room_name, self.score_x, self.score_o, outcome
        );
        Ok(outcome)
    }

    /// Vacate a seat. Returns the departed player, or `None` if not seated.
    pub fn remove_player(&mut self, id: &ConnectionId) -> Option<Player> {
        let index = self.players.iter().position(|p| &p.id == id)?;
        let player = self.players.remove(index);
        self.ready.remove(id);
        // The remaining player (if any) now holds seat 0.
        self.current_player_index = 0;
        Some(player)
    }

    /// Repair a zero score whose line list is non-empty.
    fn reconcile_scores(&mut self) {
        if self.score_x == 0 && !self.winning_lines_x.is_empty() {
            self.score_x = self.winning_lines_x.len() as u32;
            warn!("Repaired X score to {} in room {:?}", self.score_x, self.room_name);
        }
        if self.score_o == 0 && !self.winning_lines_o.is_empty() {
            self.score_o = self.winning_lines_o.len() as u32;
            warn!("Repaired O score to {} in room {:?}", self.score_o, self.room_name);
        }
    }

    fn record_line(&mut self, mark: Mark, line: WinningLine) {
        match mark {
            Mark::X => {
                self.winning_lines_x.push(line);
                self.score_x += 1;
            }
            Mark::O => {
                self.winning_lines_o.push(line);
                self.score_o += 1;
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current lifecycle state.
    pub fn phase(&self) -> SessionPhase {
        if self.is_over {
            SessionPhase::Over
        } else if self.players.len() < MAX_PLAYERS {
            SessionPhase::WaitingForOpponent
        } else {
            SessionPhase::InProgress
        }
    }

    /// The cube.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Seated players in seat order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Seat index of the player to move.
    pub fn current_player_index(&self) -> usize {
        self.current_player_index
    }

    /// Player to move, if that seat is filled.
    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    /// Seated player for a connection.
    pub fn player(&self, id: &ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Whether a connection holds a seat.
    pub fn is_seated(&self, id: &ConnectionId) -> bool {
        self.player(id).is_some()
    }

    /// No seats filled.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Lines scored by a symbol.
    pub fn score(&self, mark: Mark) -> u32 {
        match mark {
            Mark::X => self.score_x,
            Mark::O => self.score_o,
        }
    }

    /// Lines completed by a symbol, in scoring order.
    pub fn winning_lines(&self, mark: Mark) -> &[WinningLine] {
        match mark {
            Mark::X => &self.winning_lines_x,
            Mark::O => &self.winning_lines_o,
        }
    }

    /// Most recent line scored since the last restart.
    pub fn last_winning_line(&self) -> Option<&WinningLine> {
        self.last_winning_line.as_ref()
    }

    /// Final result, once the match is over.
    pub fn winner(&self) -> Option<Outcome> {
        self.winner
    }

    /// Whether the match has a final result.
    pub fn is_over(&self) -> bool {
        self.is_over
    }

    /// Connections that voted to restart.
    pub fn ready_players(&self) -> impl Iterator<Item = &ConnectionId> {
        self.ready.iter()
    }

    /// Number of restart votes.
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Room display name.
    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// Name the creator used.
    pub fn creator_name(&self) -> &str {
        &self.creator_name
    }

    /// Whether joining requires a password.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::win::detect;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn id(n: u8) -> ConnectionId {
        ConnectionId(uuid::Uuid::from_bytes([n; 16]))
    }

    fn c(x: u8, y: u8, z: u8) -> Coord {
        Coord::new(x, y, z)
    }

    /// Room "R" by Alice (X, id 1) with Bob (O, id 2) seated.
    fn two_player_session() -> Session {
        let mut session = Session::new("R", id(1), "Alice", None);
        session.join(id(2), "Bob", None).unwrap();
        session
    }

    /// Play moves alternately starting from whoever is current.
    fn play(session: &mut Session, moves: &[Coord]) -> Vec<MoveOutcome> {
        moves
            .iter()
            .map(|&at| {
                let mover = session.current_player().unwrap().id;
                session.make_move(mover, at).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_create_seats_creator_as_x() {
        let session = Session::new("Room", id(1), "Alice", None);
        assert_eq!(session.players().len(), 1);
        assert_eq!(session.players()[0].symbol, Mark::X);
        assert_eq!(session.creator_name(), "Alice");
        assert_eq!(session.phase(), SessionPhase::WaitingForOpponent);
        assert!(session.board().is_empty());
        assert!(!session.has_password());
    }

    #[test]
    fn test_empty_password_means_none() {
        let session = Session::new("Room", id(1), "Alice", Some(String::new()));
        assert!(!session.has_password());
    }

    #[test]
    fn test_join_assigns_o_and_starts() {
        let session = two_player_session();
        assert_eq!(session.players()[1].symbol, Mark::O);
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.current_player().unwrap().name, "Alice");
    }

    #[test]
    fn test_join_room_full() {
        let mut session = two_player_session();
        assert_eq!(session.join(id(3), "Carol", None), Err(GameError::RoomFull));
        assert_eq!(session.players().len(), 2);
    }

    #[test]
    fn test_join_wrong_password() {
        let mut session = Session::new("Secret", id(1), "Alice", Some("hunter2".into()));
        assert_eq!(
            session.join(id(2), "Bob", Some("guess")),
            Err(GameError::WrongPassword)
        );
        assert_eq!(session.join(id(2), "Bob", None), Err(GameError::WrongPassword));
        assert_eq!(session.players().len(), 1);

        session.join(id(2), "Bob", Some("hunter2")).unwrap();
        assert_eq!(session.players().len(), 2);
    }

    #[test]
    fn test_join_name_taken_case_insensitive() {
        let mut session = Session::new("R", id(1), "Alice", None);
        assert_eq!(session.join(id(2), "aLiCe", None), Err(GameError::NameTaken));
        assert_eq!(session.players().len(), 1);
    }

    #[test]
    fn test_join_same_connection_twice() {
        let mut session = Session::new("R", id(1), "Alice", None);
        assert_eq!(session.join(id(1), "Alias", None), Err(GameError::AlreadySeated));
    }

    #[test]
    fn test_move_requires_opponent() {
        let mut session = Session::new("R", id(1), "Alice", None);
        assert_eq!(
            session.make_move(id(1), c(0, 0, 0)),
            Err(GameError::OpponentMissing)
        );
        assert!(session.board().is_empty());
    }

    #[test]
    fn test_move_not_your_turn() {
        let mut session = two_player_session();
        assert_eq!(session.make_move(id(2), c(0, 0, 0)), Err(GameError::NotYourTurn));
        assert_eq!(session.make_move(id(9), c(0, 0, 0)), Err(GameError::NotYourTurn));
        assert!(session.board().is_empty());
    }

    #[test]
    fn test_move_out_of_range() {
        let mut session = two_player_session();
        assert_eq!(session.make_move(id(1), c(0, 3, 0)), Err(GameError::OutOfRange));
        assert_eq!(session.current_player_index(), 0);
    }

    #[test]
    fn test_occupied_cell_leaves_state_unchanged() {
        let mut session = two_player_session();
        session.make_move(id(1), c(1, 1, 1)).unwrap();
        let board_before = session.board().clone();

        assert_eq!(session.make_move(id(2), c(1, 1, 1)), Err(GameError::CellOccupied));
        assert_eq!(session.board(), &board_before);
        assert_eq!(session.current_player_index(), 1);
        assert_eq!(session.score(Mark::X), 0);
        assert_eq!(session.score(Mark::O), 0);
    }

    #[test]
    fn test_turn_alternates() {
        let mut session = two_player_session();
        for at in [c(0, 0, 0), c(2, 2, 2), c(0, 2, 0)] {
            let before = session.current_player_index();
            let mover = session.current_player().unwrap().id;
            session.make_move(mover, at).unwrap();
            assert_ne!(session.current_player_index(), before);
        }
    }

    #[test]
    fn test_scoring_line_does_not_end_match() {
        let mut session = two_player_session();
        let outcomes = play(
            &mut session,
            &[c(1, 1, 1), c(0, 0, 0), c(1, 1, 0), c(2, 2, 0), c(1, 1, 2)],
        );

        let last = outcomes.last().unwrap();
        let expected = [c(1, 1, 0), c(1, 1, 1), c(1, 1, 2)];
        assert_eq!(last.mark, Mark::X);
        assert_eq!(last.scored, vec![expected]);
        assert_eq!(last.finished, None);
        assert_eq!(session.score(Mark::X), 1);
        assert_eq!(session.score(Mark::O), 0);
        assert_eq!(session.last_winning_line(), Some(&expected));
        assert_eq!(session.winning_lines(Mark::X), &[expected]);
        assert_eq!(session.winner(), None);
        assert!(!session.is_over());
        // turn still passes to O after scoring
        assert_eq!(session.current_player().unwrap().symbol, Mark::O);
    }

    #[test]
    fn test_last_winning_line_matches_detector() {
        let mut session = two_player_session();
        let moves = [c(0, 0, 0), c(2, 0, 0), c(0, 1, 0), c(2, 1, 0), c(0, 2, 0)];
        let outcomes = play(&mut session, &moves);
        let last = outcomes.last().unwrap();

        let (mark, line) = detect(session.board(), last.at).unwrap();
        assert_eq!(mark, last.mark);
        assert_eq!(session.last_winning_line(), Some(&line));
    }

    #[test]
    fn test_move_scoring_two_lines_counts_both() {
        let mut session = two_player_session();
        // X: (0,1,1) (2,1,1) (0,0,1) (2,2,1) then center completes two lines.
        let outcomes = play(
            &mut session,
            &[
                c(0, 1, 1),
                c(0, 0, 0),
                c(2, 1, 1),
                c(2, 0, 0),
                c(0, 0, 1),
                c(0, 2, 2),
                c(2, 2, 1),
                c(2, 0, 2),
                c(1, 1, 1),
            ],
        );
        let last = outcomes.last().unwrap();
        assert_eq!(last.scored.len(), 2);
        assert_eq!(session.score(Mark::X), 2);
        assert_eq!(session.winning_lines(Mark::X).len(), 2);
        assert_eq!(session.last_winning_line(), Some(&last.scored[0]));
    }

    /// Fill the cube so that the final move lands on (0,0,0).
    ///
    /// Returns X's and O's cells in the order they are placed.
    fn fill_order() -> Vec<Coord> {
        // Layer-by-layer checkerboard; X takes even parity cells (14), O odd (13).
        let mut xs: Vec<Coord> = Coord::all().filter(|p| (p.x + p.y + p.z) % 2 == 0).collect();
        let os: Vec<Coord> = Coord::all().filter(|p| (p.x + p.y + p.z) % 2 == 1).collect();
        // X places (0,0,0) last.
        xs.retain(|p| *p != c(0, 0, 0));
        xs.push(c(0, 0, 0));
        let mut order = Vec::new();
        for i in 0..xs.len() {
            order.push(xs[i]);
            if let Some(o) = os.get(i) {
                order.push(*o);
            }
        }
        order
    }

    #[test]
    fn test_full_board_settles_winner() {
        let mut session = two_player_session();
        let outcomes = play(&mut session, &fill_order());

        assert!(session.board().is_full());
        assert!(session.is_over());
        assert_eq!(session.phase(), SessionPhase::Over);

        let expected = Outcome::from_scores(session.score(Mark::X), session.score(Mark::O));
        assert_eq!(session.winner(), Some(expected));
        assert_eq!(outcomes.last().unwrap().finished, Some(expected));
        // only the last move finishes the match
        assert!(outcomes[..outcomes.len() - 1].iter().all(|o| o.finished.is_none()));
    }

    #[test]
    fn test_full_board_five_to_three() {
        // Final position: planes by x, rows by y, columns by z.
        const LAYOUT: [[&str; 3]; 3] = [
            ["XOX", "XOX", "OXX"],
            ["OXO", "XOO", "OOX"],
            ["XOX", "XOO", "OXX"],
        ];
        let (xs, os): (Vec<Coord>, Vec<Coord>) = Coord::all()
            .partition(|at| LAYOUT[at.x as usize][at.y as usize].as_bytes()[at.z as usize] == b'X');
        assert_eq!((xs.len(), os.len()), (14, 13));

        let mut order = Vec::new();
        for (i, at) in xs.iter().enumerate() {
            order.push(*at);
            if let Some(o) = os.get(i) {
                order.push(*o);
            }
        }

        let mut session = two_player_session();
        let outcomes = play(&mut session, &order);

        let lines_by = |mark: Mark| -> usize {
            outcomes
                .iter()
                .filter(|o| o.mark == mark)
                .map(|o| o.scored.len())
                .sum()
        };
        assert_eq!(lines_by(Mark::X), 5);
        assert_eq!(lines_by(Mark::O), 3);
        assert_eq!(session.score(Mark::X), 5);
        assert_eq!(session.score(Mark::O), 3);
        assert_eq!(session.winning_lines(Mark::X).len(), 5);
        assert_eq!(session.winning_lines(Mark::O).len(), 3);

        assert!(session.board().is_full());
        assert!(session.is_over());
        assert_eq!(session.winner(), Some(Outcome::X));
        assert_eq!(outcomes.last().unwrap().finished, Some(Outcome::X));
        assert!(outcomes[..outcomes.len() - 1].iter().all(|o| o.finished.is_none()));
    }

    #[test]
    fn test_move_after_end_is_game_over() {
        let mut session = two_player_session();
        session.end_game().unwrap();
        assert_eq!(session.make_move(id(1), c(0, 0, 0)), Err(GameError::GameOver));
        assert!(session.board().is_empty());
    }

    #[test]
    fn test_restart_vote_is_idempotent() {
        let mut session = two_player_session();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            session.vote_restart(id(1), &mut rng),
            Ok(RestartOutcome::Waiting { ready: 1 })
        );
        assert_eq!(
            session.vote_restart(id(1), &mut rng),
            Ok(RestartOutcome::Waiting { ready: 1 })
        );
        assert_eq!(session.ready_count(), 1);
    }

    #[test]
    fn test_restart_requires_seat() {
        let mut session = two_player_session();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            session.vote_restart(id(5), &mut rng),
            Err(GameError::PlayerNotSeated)
        );
        assert_eq!(session.ready_count(), 0);
    }

    #[test]
    fn test_single_player_cannot_restart_alone() {
        let mut session = Session::new("R", id(1), "Alice", None);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            session.vote_restart(id(1), &mut rng),
            Ok(RestartOutcome::Waiting { ready: 1 })
        );
    }

    #[test]
    fn test_both_votes_reset_match() {
        let mut session = two_player_session();
        play(
            &mut session,
            &[c(1, 1, 1), c(0, 0, 0), c(1, 1, 0), c(2, 2, 0), c(1, 1, 2)],
        );
        session.end_game().unwrap();
        assert!(session.is_over());

        let mut rng = StdRng::seed_from_u64(42);
        session.vote_restart(id(2), &mut rng).unwrap();
        let result = session.vote_restart(id(1), &mut rng).unwrap();

        let first = match result {
            RestartOutcome::Restarted { first } => first,
            other => panic!("expected restart, got {:?}", other),
        };
        assert!(session.current_player_index() < MAX_PLAYERS);
        assert_eq!(session.current_player().unwrap().symbol, first);
        assert!(session.board().is_empty());
        assert_eq!(session.score(Mark::X), 0);
        assert_eq!(session.score(Mark::O), 0);
        assert!(session.winning_lines(Mark::X).is_empty());
        assert!(session.winning_lines(Mark::O).is_empty());
        assert_eq!(session.last_winning_line(), None);
        assert_eq!(session.winner(), None);
        assert!(!session.is_over());
        assert_eq!(session.ready_count(), 0);
        assert_eq!(session.phase(), SessionPhase::InProgress);
    }

    #[test]
    fn test_restart_start_seat_varies() {
        let mut seen = BTreeSet::new();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..64 {
            let mut session = two_player_session();
            session.vote_restart(id(1), &mut rng).unwrap();
            session.vote_restart(id(2), &mut rng).unwrap();
            seen.insert(session.current_player_index());
        }
        assert_eq!(seen, BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_end_game_requires_opponent() {
        let mut session = Session::new("R", id(1), "Alice", None);
        assert_eq!(session.end_game(), Err(GameError::OpponentMissing));
        assert!(!session.is_over());
    }

    #[test]
    fn test_end_game_decides_by_score() {
        let mut session = two_player_session();
        assert_eq!(session.end_game(), Ok(Outcome::Draw));

        let mut session = two_player_session();
        play(
            &mut session,
            &[c(1, 1, 1), c(0, 0, 0), c(1, 1, 0), c(2, 2, 0), c(1, 1, 2)],
        );
        assert_eq!(session.end_game(), Ok(Outcome::X));
        assert!(session.is_over());
        assert_eq!(session.winner(), Some(Outcome::X));
    }

    #[test]
    fn test_end_game_repairs_diverged_score() {
        let mut session = two_player_session();
        let line = [c(0, 0, 0), c(0, 0, 1), c(0, 0, 2)];
        session.winning_lines_o.push(line);
        session.winning_lines_o.push([c(1, 0, 0), c(1, 0, 1), c(1, 0, 2)]);
        assert_eq!(session.score(Mark::O), 0);

        assert_eq!(session.end_game(), Ok(Outcome::O));
        assert_eq!(session.score(Mark::O), 2);
        assert_eq!(session.score(Mark::X), 0);
    }

    #[test]
    fn test_remove_player_clears_vote_and_reseats() {
        let mut session = two_player_session();
        let mut rng = StdRng::seed_from_u64(0);
        session.make_move(id(1), c(0, 0, 0)).unwrap();
        session.vote_restart(id(2), &mut rng).unwrap();

        let left = session.remove_player(&id(1)).unwrap();
        assert_eq!(left.name, "Alice");
        assert_eq!(session.players().len(), 1);
        assert_eq!(session.ready_count(), 1);
        assert_eq!(session.current_player().unwrap().name, "Bob");
        assert_eq!(session.phase(), SessionPhase::WaitingForOpponent);

        session.remove_player(&id(2)).unwrap();
        assert!(session.is_empty());
        assert_eq!(session.ready_count(), 0);
    }

    #[test]
    fn test_remove_unknown_player() {
        let mut session = two_player_session();
        assert_eq!(session.remove_player(&id(7)), None);
        assert_eq!(session.players().len(), 2);
    }

    #[test]
    fn test_replacement_gets_free_symbol() {
        let mut session = two_player_session();
        session.remove_player(&id(1));
        let carol = session.join(id(3), "Carol", None).unwrap();
        assert_eq!(carol.symbol, Mark::X);
    }

    proptest! {
        #[test]
        fn prop_scores_match_line_lists(picks in prop::collection::vec(0usize..27, 1..40)) {
            let mut session = two_player_session();
            for pick in picks {
                let free: Vec<Coord> = Coord::all()
                    .filter(|&p| session.board().get(p).unwrap().is_none())
                    .collect();
                if free.is_empty() || session.is_over() {
                    break;
                }
                let at = free[pick % free.len()];
                let before = session.current_player_index();
                let mover = session.current_player().unwrap().id;
                session.make_move(mover, at).unwrap();

                prop_assert_ne!(session.current_player_index(), before);
                prop_assert_eq!(session.score(Mark::X) as usize, session.winning_lines(Mark::X).len());
                prop_assert_eq!(session.score(Mark::O) as usize, session.winning_lines(Mark::O).len());
                prop_assert_eq!(session.is_over(), session.board().is_full());
                prop_assert_eq!(session.is_over(), session.winner().is_some());
            }
        }
    }
}
