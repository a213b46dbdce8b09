//! Cube Board
//!
//! The 3x3x3 playing field. Cells are indexed `[x][y][z]`, each axis 0..=2.

use serde::{Deserialize, Serialize};

use crate::game::error::GameError;

/// Cells along each axis.
pub const BOARD_SIZE: usize = 3;

/// Total cells in the cube.
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE * BOARD_SIZE;

// =============================================================================
// MARK
// =============================================================================

/// A player's symbol. The room creator always plays `X`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// First seat.
    X,
    /// Second seat.
    O,
}

impl Mark {
    /// The other symbol.
    #[inline]
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

// =============================================================================
// COORDINATE
// =============================================================================

/// A cell coordinate. Serialized as `[x, y, z]`.
///
/// A `Coord` may hold out-of-range components; the board checks bounds on
/// every access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Coord {
    /// X component.
    pub x: u8,
    /// Y component.
    pub y: u8,
    /// Z component.
    pub z: u8,
}

impl Coord {
    /// Create a coordinate without bounds checking.
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Convert untrusted integers (e.g. from the wire) into a coordinate.
    ///
    /// Components that do not fit a `u8` saturate to an out-of-range value,
    /// so the board still rejects them with [`GameError::OutOfRange`].
    pub fn saturating_from(x: i64, y: i64, z: i64) -> Self {
        let axis = |v: i64| u8::try_from(v).unwrap_or(u8::MAX);
        Self::new(axis(x), axis(y), axis(z))
    }

    /// Whether every component lies in 0..=2.
    #[inline]
    pub fn in_bounds(self) -> bool {
        (self.x as usize) < BOARD_SIZE
            && (self.y as usize) < BOARD_SIZE
            && (self.z as usize) < BOARD_SIZE
    }

    /// Step once along `dir`, returning `None` when the step leaves the cube.
    pub fn step(self, dir: [i8; 3]) -> Option<Coord> {
        let axis = |v: u8, d: i8| -> Option<u8> {
            let next = v as i16 + d as i16;
            if (0..BOARD_SIZE as i16).contains(&next) {
                Some(next as u8)
            } else {
                None
            }
        };
        Some(Coord::new(
            axis(self.x, dir[0])?,
            axis(self.y, dir[1])?,
            axis(self.z, dir[2])?,
        ))
    }

    /// Iterate all 27 cells in `[x][y][z]` order.
    pub fn all() -> impl Iterator<Item = Coord> {
        (0..BOARD_SIZE as u8).flat_map(|x| {
            (0..BOARD_SIZE as u8)
                .flat_map(move |y| (0..BOARD_SIZE as u8).map(move |z| Coord::new(x, y, z)))
        })
    }
}

impl From<[u8; 3]> for Coord {
    fn from([x, y, z]: [u8; 3]) -> Self {
        Coord::new(x, y, z)
    }
}

impl From<Coord> for [u8; 3] {
    fn from(c: Coord) -> Self {
        [c.x, c.y, c.z]
    }
}

// =============================================================================
// BOARD
// =============================================================================

type Grid = [[[Option<Mark>; BOARD_SIZE]; BOARD_SIZE]; BOARD_SIZE];

/// The 3x3x3 grid. Serialized as nested arrays of `"X"`, `"O"` or `""`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    #[serde(with = "cell_text")]
    cells: Grid,
}

/// Cells as the strings clients render: a symbol, or `""` when empty.
mod cell_text {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Grid, Mark};

    fn to_text(cell: Option<Mark>) -> &'static str {
        match cell {
            Some(Mark::X) => "X",
            Some(Mark::O) => "O",
            None => "",
        }
    }

    fn from_text(text: &str) -> Result<Option<Mark>, String> {
        match text {
            "X" => Ok(Some(Mark::X)),
            "O" => Ok(Some(Mark::O)),
            "" => Ok(None),
            other => Err(format!("invalid cell {:?}", other)),
        }
    }

    pub fn serialize<S: Serializer>(cells: &Grid, serializer: S) -> Result<S::Ok, S::Error> {
        cells
            .map(|plane| plane.map(|row| row.map(to_text)))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Grid, D::Error> {
        let text = <[[[String; 3]; 3]; 3]>::deserialize(deserializer)?;
        let mut cells = Grid::default();
        for (x, plane) in text.iter().enumerate() {
            for (y, row) in plane.iter().enumerate() {
                for (z, cell) in row.iter().enumerate() {
                    cells[x][y][z] = from_text(cell).map_err(D::Error::custom)?;
                }
            }
        }
        Ok(cells)
    }
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a cell.
    pub fn get(&self, at: Coord) -> Result<Option<Mark>, GameError> {
        if !at.in_bounds() {
            return Err(GameError::OutOfRange);
        }
        Ok(self.cells[at.x as usize][at.y as usize][at.z as usize])
    }

    /// Write a cell.
    pub fn set(&mut self, at: Coord, mark: Option<Mark>) -> Result<(), GameError> {
        if !at.in_bounds() {
            return Err(GameError::OutOfRange);
        }
        self.cells[at.x as usize][at.y as usize][at.z as usize] = mark;
        Ok(())
    }

    /// Number of non-empty cells.
    pub fn filled_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .flatten()
            .filter(|cell| cell.is_some())
            .count()
    }

    /// True iff all 27 cells hold a mark.
    pub fn is_full(&self) -> bool {
        self.filled_count() == CELL_COUNT
    }

    /// True iff no cell holds a mark.
    pub fn is_empty(&self) -> bool {
        self.filled_count() == 0
    }

    /// Clear every cell.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        assert!(board.is_empty());
        assert!(!board.is_full());
        for at in Coord::all() {
            assert_eq!(board.get(at).unwrap(), None);
        }
    }

    #[test]
    fn test_all_visits_every_cell_once() {
        let cells: Vec<Coord> = Coord::all().collect();
        assert_eq!(cells.len(), CELL_COUNT);
        let unique: std::collections::BTreeSet<_> = cells.iter().copied().collect();
        assert_eq!(unique.len(), CELL_COUNT);
    }

    #[test]
    fn test_set_and_get() {
        let mut board = Board::new();
        board.set(Coord::new(2, 0, 1), Some(Mark::O)).unwrap();
        assert_eq!(board.get(Coord::new(2, 0, 1)).unwrap(), Some(Mark::O));
        assert_eq!(board.get(Coord::new(1, 0, 2)).unwrap(), None);
        assert_eq!(board.filled_count(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let mut board = Board::new();
        assert_eq!(board.get(Coord::new(3, 0, 0)), Err(GameError::OutOfRange));
        assert_eq!(
            board.set(Coord::new(0, 0, 7), Some(Mark::X)),
            Err(GameError::OutOfRange)
        );
        assert!(board.is_empty());
    }

    #[test]
    fn test_saturating_from() {
        assert_eq!(Coord::saturating_from(0, 1, 2), Coord::new(0, 1, 2));
        assert!(!Coord::saturating_from(-1, 1, 2).in_bounds());
        assert!(!Coord::saturating_from(0, 3, 2).in_bounds());
        assert!(!Coord::saturating_from(0, 1, 9_000).in_bounds());
        let board = Board::new();
        assert_eq!(
            board.get(Coord::saturating_from(-5, 0, 0)),
            Err(GameError::OutOfRange)
        );
    }

    #[test]
    fn test_step_stops_at_edges() {
        assert_eq!(Coord::new(1, 1, 1).step([1, -1, 0]), Some(Coord::new(2, 0, 1)));
        assert_eq!(Coord::new(2, 1, 1).step([1, 0, 0]), None);
        assert_eq!(Coord::new(0, 1, 1).step([0, 0, 1]), Some(Coord::new(0, 1, 2)));
        assert_eq!(Coord::new(0, 1, 0).step([0, 0, -1]), None);
    }

    #[test]
    fn test_full_and_reset() {
        let mut board = Board::new();
        for (i, at) in Coord::all().enumerate() {
            let mark = if i % 2 == 0 { Mark::X } else { Mark::O };
            board.set(at, Some(mark)).unwrap();
        }
        assert!(board.is_full());

        board.reset();
        assert!(board.is_empty());
    }

    #[test]
    fn test_coord_serializes_as_array() {
        let json = serde_json::to_string(&Coord::new(1, 2, 0)).unwrap();
        assert_eq!(json, "[1,2,0]");
        let parsed: Coord = serde_json::from_str("[0,0,2]").unwrap();
        assert_eq!(parsed, Coord::new(0, 0, 2));
    }

    #[test]
    fn test_board_serializes_nested() {
        let mut board = Board::new();
        board.set(Coord::new(0, 0, 0), Some(Mark::X)).unwrap();
        board.set(Coord::new(1, 2, 0), Some(Mark::O)).unwrap();
        let value = serde_json::to_value(&board).unwrap();
        assert_eq!(value[0][0][0], "X");
        assert_eq!(value[1][2][0], "O");
        assert_eq!(value[2][2][2], "");

        let parsed: Board = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, board);
    }

    #[test]
    fn test_board_rejects_unknown_cell() {
        let mut value = serde_json::to_value(Board::new()).unwrap();
        value[0][0][0] = serde_json::json!("Z");
        assert!(serde_json::from_value::<Board>(value).is_err());

        let null_cell = serde_json::json!([[[null, "", ""], ["", "", ""], ["", "", ""]],
            [["", "", ""], ["", "", ""], ["", "", ""]],
            [["", "", ""], ["", "", ""], ["", "", ""]]]);
        assert!(serde_json::from_value::<Board>(null_cell).is_err());
    }
}
