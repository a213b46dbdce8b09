//! Win Line Detection
//!
//! Checks whether the mark just placed completes a line of three through
//! the cube. Only lines through the placed cell are examined: every other
//! line was already checked when its own last cell was filled.

use crate::game::board::{Board, Coord, Mark, BOARD_SIZE};

/// Three collinear cells, ordered from the negative end of the direction
/// to the positive end.
pub type WinningLine = [Coord; 3];

/// Positive half of each direction pair; the negative half is its negation.
///
/// Order: the three axes, the six planar diagonals (XY, XZ, YZ, each with
/// its mirror), then the four space diagonals.
pub const DIRECTIONS: [[i8; 3]; 13] = [
    [1, 0, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 1, 0],
    [1, -1, 0],
    [1, 0, 1],
    [1, 0, -1],
    [0, 1, 1],
    [0, 1, -1],
    [1, 1, 1],
    [1, 1, -1],
    [1, -1, 1],
    [1, -1, -1],
];

/// Find the first line completed by the mark at `last`.
///
/// Returns `None` if `last` is empty, out of range, or part of no full line.
pub fn detect(board: &Board, last: Coord) -> Option<(Mark, WinningLine)> {
    let mark = board.get(last).ok().flatten()?;
    DIRECTIONS
        .iter()
        .find_map(|&dir| run_through(board, last, mark, dir))
        .map(|line| (mark, line))
}

/// Find every line completed by the mark at `last`, in direction order.
pub fn detect_all(board: &Board, last: Coord) -> Vec<WinningLine> {
    let Some(mark) = board.get(last).ok().flatten() else {
        return Vec::new();
    };
    DIRECTIONS
        .iter()
        .filter_map(|&dir| run_through(board, last, mark, dir))
        .collect()
}

/// Contiguous run of `mark` through `origin` along `dir`, if it spans three cells.
fn run_through(board: &Board, origin: Coord, mark: Mark, dir: [i8; 3]) -> Option<WinningLine> {
    let backward = walk(board, origin, mark, [-dir[0], -dir[1], -dir[2]]);
    let forward = walk(board, origin, mark, dir);

    if backward.len() + 1 + forward.len() < BOARD_SIZE {
        return None;
    }

    let run: Vec<Coord> = backward
        .into_iter()
        .rev()
        .chain(std::iter::once(origin))
        .chain(forward)
        .collect();

    // A run can never exceed the cube's edge length.
    WinningLine::try_from(run.as_slice()).ok()
}

/// Cells matching `mark` stepping away from `origin`, at most two steps.
fn walk(board: &Board, origin: Coord, mark: Mark, dir: [i8; 3]) -> Vec<Coord> {
    let mut cells = Vec::with_capacity(BOARD_SIZE - 1);
    let mut at = origin;
    for _ in 0..BOARD_SIZE - 1 {
        match at.step(dir) {
            Some(next) if board.get(next) == Ok(Some(mark)) => {
                cells.push(next);
                at = next;
            }
            _ => break,
        }
    }
    cells
}
