//! Grid - the canonical 2-D color container and its pure operations.
//!
//! Grids are immutable once constructed; every operation returns a new grid.
//! Storage is a flat row-major `Vec<u8>` with explicit width/height, indexed
//! as `row * width + col`.

use serde::{Deserialize, Serialize};

/// Highest legal cell value.
pub const MAX_COLOR: u8 = 9;

/// Background color.
pub const BACKGROUND: u8 = 0;

/// Rectangular grid of color codes in 0-9, 0 = background.
///
/// On the wire a grid is an ordered sequence of rows; construction validates
/// rectangularity, non-emptiness, and the value range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u8>>", into = "Vec<Vec<u8>>")]
pub struct Grid {
    cells: Vec<u8>,
    width: usize,
    height: usize,
}

/// Mirror axis for [`Grid::flip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Left-right mirror (columns reversed).
    Horizontal,
    /// Top-bottom mirror (rows reversed).
    Vertical,
    /// Both-axis flip, equivalent to a half turn.
    Both,
}

/// One cell-level difference between two grids of equal dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDiff {
    pub row: usize,
    pub col: usize,
    pub from: u8,
    pub to: u8,
}

impl Grid {
    /// Build a grid from nested rows, validating shape and value range.
    pub fn from_rows(rows: Vec<Vec<u8>>) -> Result<Self, GridError> {
        if rows.is_empty() || rows[0].is_empty() {
            return Err(GridError::Empty);
        }
        let width = rows[0].len();
        let height = rows.len();
        let mut cells = Vec::with_capacity(width * height);
        for (r, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(GridError::Ragged {
                    row: r,
                    expected: width,
                    got: row.len(),
                });
            }
            for (c, &value) in row.iter().enumerate() {
                if value > MAX_COLOR {
                    return Err(GridError::ValueOutOfRange {
                        row: r,
                        col: c,
                        value,
                    });
                }
                cells.push(value);
            }
        }
        Ok(Self {
            cells,
            width,
            height,
        })
    }

    /// Grid of the given dimensions filled with one color.
    pub fn filled(height: usize, width: usize, color: u8) -> Result<Self, GridError> {
        if height == 0 || width == 0 {
            return Err(GridError::Empty);
        }
        if color > MAX_COLOR {
            return Err(GridError::ValueOutOfRange {
                row: 0,
                col: 0,
                value: color,
            });
        }
        Ok(Self {
            cells: vec![color; width * height],
            width,
            height,
        })
    }

    /// Internal constructor for cells already known to be valid.
    pub(crate) fn from_flat(cells: Vec<u8>, height: usize, width: usize) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self {
            cells,
            width,
            height,
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Total cell count.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Value at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[row * self.width + col]
    }

    /// Flat row-major cell slice.
    #[inline]
    pub(crate) fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// True when both grids have the same dimensions.
    #[inline]
    pub fn same_dimensions(&self, other: &Grid) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Mirror across the given axis.
    pub fn flip(&self, axis: Axis) -> Grid {
        let mut cells = Vec::with_capacity(self.cells.len());
        for r in 0..self.height {
            for c in 0..self.width {
                let (sr, sc) = match axis {
                    Axis::Horizontal => (r, self.width - 1 - c),
                    Axis::Vertical => (self.height - 1 - r, c),
                    Axis::Both => (self.height - 1 - r, self.width - 1 - c),
                };
                cells.push(self.get(sr, sc));
            }
        }
        Grid::from_flat(cells, self.height, self.width)
    }

    /// Rotate clockwise by the given number of quarter turns (mod 4).
    pub fn rotate(&self, quarter_turns: u32) -> Grid {
        match quarter_turns % 4 {
            0 => self.clone(),
            1 => {
                // (h, w) -> (w, h); out[r][c] = in[h-1-c][r]
                let mut cells = Vec::with_capacity(self.cells.len());
                for r in 0..self.width {
                    for c in 0..self.height {
                        cells.push(self.get(self.height - 1 - c, r));
                    }
                }
                Grid::from_flat(cells, self.width, self.height)
            }
            2 => self.flip(Axis::Both),
            _ => {
                // out[r][c] = in[c][w-1-r]
                let mut cells = Vec::with_capacity(self.cells.len());
                for r in 0..self.width {
                    for c in 0..self.height {
                        cells.push(self.get(c, self.width - 1 - r));
                    }
                }
                Grid::from_flat(cells, self.width, self.height)
            }
        }
    }

    /// Cell-level differences against another grid of the same dimensions.
    ///
    /// Returns `None` when dimensions differ.
    pub fn diff_cells(&self, other: &Grid) -> Option<Vec<CellDiff>> {
        if !self.same_dimensions(other) {
            return None;
        }
        let mut diffs = Vec::new();
        for r in 0..self.height {
            for c in 0..self.width {
                let from = self.get(r, c);
                let to = other.get(r, c);
                if from != to {
                    diffs.push(CellDiff {
                        row: r,
                        col: c,
                        from,
                        to,
                    });
                }
            }
        }
        Some(diffs)
    }

    /// Fraction of matching cells, 0.0 when dimensions differ.
    pub fn similarity(&self, other: &Grid) -> f32 {
        if !self.same_dimensions(other) {
            return 0.0;
        }
        let matching = self
            .cells
            .iter()
            .zip(other.cells.iter())
            .filter(|(a, b)| a == b)
            .count();
        matching as f32 / self.cells.len() as f32
    }

    /// Extract the sub-region starting at (row, col) with the given size.
    ///
    /// Returns `None` when the region does not fit inside the grid.
    pub fn subgrid(&self, row: usize, col: usize, height: usize, width: usize) -> Option<Grid> {
        if height == 0 || width == 0 || row + height > self.height || col + width > self.width {
            return None;
        }
        let mut cells = Vec::with_capacity(height * width);
        for r in row..row + height {
            for c in col..col + width {
                cells.push(self.get(r, c));
            }
        }
        Some(Grid::from_flat(cells, height, width))
    }

    /// Tile this grid `rows x cols` times.
    pub fn tile(&self, rows: usize, cols: usize) -> Grid {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let height = self.height * rows;
        let width = self.width * cols;
        let mut cells = Vec::with_capacity(height * width);
        for r in 0..height {
            for c in 0..width {
                cells.push(self.get(r % self.height, c % self.width));
            }
        }
        Grid::from_flat(cells, height, width)
    }

    /// Apply a function to every cell value, clamping results to the color range.
    pub fn map_cells<F: Fn(u8) -> u8>(&self, f: F) -> Grid {
        let cells = self.cells.iter().map(|&v| f(v).min(MAX_COLOR)).collect();
        Grid::from_flat(cells, self.height, self.width)
    }

    /// Occurrence count per color value.
    pub fn color_histogram(&self) -> [usize; 10] {
        let mut hist = [0usize; 10];
        for &v in &self.cells {
            hist[v as usize] += 1;
        }
        hist
    }

    /// Most frequent non-background color; ties break toward the smaller value.
    pub fn most_frequent_non_background(&self) -> Option<u8> {
        let hist = self.color_histogram();
        hist.iter()
            .enumerate()
            .skip(1)
            .filter(|&(_, &count)| count > 0)
            .max_by(|(ca, a), (cb, b)| a.cmp(b).then(cb.cmp(ca)))
            .map(|(color, _)| color as u8)
    }
}

impl TryFrom<Vec<Vec<u8>>> for Grid {
    type Error = GridError;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        Grid::from_rows(rows)
    }
}

impl From<Grid> for Vec<Vec<u8>> {
    fn from(grid: Grid) -> Self {
        (0..grid.height)
            .map(|r| grid.cells[r * grid.width..(r + 1) * grid.width].to_vec())
            .collect()
    }
}

/// Grid construction errors. The only hard failure in the engine; detectors
/// and the solver never raise it on grids that were constructed successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("grid must have at least one row and one column")]
    Empty,
    #[error("row {row} has length {got}, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("cell ({row}, {col}) holds {value}, colors must be 0-9")]
    ValueOutOfRange { row: usize, col: usize, value: u8 },
}


#[cfg(test)]
mod props {
    use super::*;
    use proptest::prelude::*;

    fn arb_grid() -> impl Strategy<Value = Grid> {
        (1usize..=6, 1usize..=6).prop_flat_map(|(h, w)| {
            proptest::collection::vec(0u8..=MAX_COLOR, h * w)
                .prop_map(move |cells| Grid::from_flat(cells, h, w))
        })
    }

    proptest! {
        #[test]
        fn rotate_twice_is_half_turn(g in arb_grid()) {
            prop_assert_eq!(g.rotate(1).rotate(1), g.rotate(2));
        }

        #[test]
        fn rotate_four_is_identity(g in arb_grid()) {
            prop_assert_eq!(g.rotate(1).rotate(1).rotate(1).rotate(1), g);
        }

        #[test]
        fn flip_is_involution(g in arb_grid()) {
            prop_assert_eq!(g.flip(Axis::Horizontal).flip(Axis::Horizontal), g.clone());
            prop_assert_eq!(g.flip(Axis::Vertical).flip(Axis::Vertical), g.clone());
            prop_assert_eq!(g.flip(Axis::Both).flip(Axis::Both), g);
        }
    }
}
