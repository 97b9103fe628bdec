//! Charuco board geometry.
//!
//! Board corners are the inner chessboard corners, numbered row-major from
//! the board origin. Corner `id` of a board with `squares_x` columns sits at
//! `((id % (squares_x-1) + 1) * square, (id / (squares_x-1) + 1) * square, 0)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Pt3, Real};

#[derive(Debug, Error, PartialEq)]
pub enum BoardError {
    #[error("board needs at least 2x2 squares, got {squares_x}x{squares_y}")]
    TooSmall { squares_x: u32, squares_y: u32 },
    #[error("square size must be positive, got {0}")]
    InvalidSquareSize(Real),
    #[error("marker size {marker} must be positive and smaller than square size {square}")]
    InvalidMarkerSize { marker: Real, square: Real },
}

/// Planar Charuco target description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharucoBoard {
    /// Number of chessboard squares along X.
    pub squares_x: u32,
    /// Number of chessboard squares along Y.
    pub squares_y: u32,
    /// Square side length in board units (typically cm).
    pub square_size: Real,
    /// ArUco marker side length in the same units.
    pub marker_size: Real,
}

impl CharucoBoard {
    pub fn new(
        squares_x: u32,
        squares_y: u32,
        square_size: Real,
        marker_size: Real,
    ) -> Result<Self, BoardError> {
        let board = Self {
            squares_x,
            squares_y,
            square_size,
            marker_size,
        };
        board.validate()?;
        Ok(board)
    }

    pub fn validate(&self) -> Result<(), BoardError> {
        if self.squares_x < 2 || self.squares_y < 2 {
            return Err(BoardError::TooSmall {
                squares_x: self.squares_x,
                squares_y: self.squares_y,
            });
        }
        if !(self.square_size > 0.0) {
            return Err(BoardError::InvalidSquareSize(self.square_size));
        }
        if !(self.marker_size > 0.0 && self.marker_size < self.square_size) {
            return Err(BoardError::InvalidMarkerSize {
                marker: self.marker_size,
                square: self.square_size,
            });
        }
        Ok(())
    }

    /// Inner corners per row.
    pub fn corners_x(&self) -> u32 {
        self.squares_x.saturating_sub(1)
    }

    /// Inner corners per column.
    pub fn corners_y(&self) -> u32 {
        self.squares_y.saturating_sub(1)
    }

    pub fn num_corners(&self) -> usize {
        self.corners_x() as usize * self.corners_y() as usize
    }

    /// 3-D position of corner `id` on the board plane (Z = 0).
    pub fn corner(&self, id: u32) -> Option<Pt3> {
        if id as usize >= self.num_corners() {
            return None;
        }
        let cols = self.corners_x();
        let col = id % cols;
        let row = id / cols;
        Some(Pt3::new(
            (col + 1) as Real * self.square_size,
            (row + 1) as Real * self.square_size,
            0.0,
        ))
    }

    /// The canonical corner table, indexed by id.
    pub fn corners(&self) -> Vec<Pt3> {
        (0..self.num_corners() as u32)
            .filter_map(|id| self.corner(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_table_layout() {
        let board = CharucoBoard::new(8, 6, 2.0, 1.5).unwrap();
        assert_eq!(board.num_corners(), 35);
        assert_eq!(board.corner(0), Some(Pt3::new(2.0, 2.0, 0.0)));
        assert_eq!(board.corner(7), Some(Pt3::new(2.0, 4.0, 0.0)));
        assert_eq!(board.corner(34), Some(Pt3::new(14.0, 10.0, 0.0)));
        assert_eq!(board.corner(35), None);
        assert_eq!(board.corners().len(), 35);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            CharucoBoard::new(1, 6, 2.0, 1.5),
            Err(BoardError::TooSmall { .. })
        ));
        assert!(matches!(
            CharucoBoard::new(8, 6, 2.0, 2.5),
            Err(BoardError::InvalidMarkerSize { .. })
        ));
    }
}
