//! Grid-space addressing shared by both endpoints.
//!
//! Cell coordinates are signed and unbounded (`i64`). Tiles partition the
//! cell grid into fixed blocks of `TILE_COLUMNS` x `TILE_ROWS` cells; both
//! dimensions are powers of two so the cell -> tile mapping is an arithmetic
//! shift, which also floors correctly for negative coordinates.

use smol_str::SmolStr;
use static_assertions::{const_assert, const_assert_eq};

/// Sheet identifier as handed over by the data engine.
pub type SheetId = SmolStr;

/// Columns covered by one tile.
pub const TILE_COLUMNS: i64 = 8;
/// Rows covered by one tile.
pub const TILE_ROWS: i64 = 32;

pub const TILE_COLUMNS_LOG2: u32 = TILE_COLUMNS.trailing_zeros();
pub const TILE_ROWS_LOG2: u32 = TILE_ROWS.trailing_zeros();

const_assert!((TILE_COLUMNS as u64).is_power_of_two());
const_assert!((TILE_ROWS as u64).is_power_of_two());
const_assert_eq!(1i64 << TILE_COLUMNS_LOG2, TILE_COLUMNS);
const_assert_eq!(1i64 << TILE_ROWS_LOG2, TILE_ROWS);

/// Width a column takes up before the data engine reports a resize.
pub const DEFAULT_COLUMN_WIDTH: f64 = 100.0;
/// Height a row takes up before the data engine reports a resize.
pub const DEFAULT_ROW_HEIGHT: f64 = 21.0;

/// Horizontal padding between a cell border and its text, in world units.
pub const CELL_TEXT_PADDING: f64 = 3.0;

/// Tile coordinates within one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePos {
    pub x: i64,
    pub y: i64,
}

impl TilePos {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Tile containing the given cell.
    pub const fn containing(column: i64, row: i64) -> Self {
        Self {
            x: column >> TILE_COLUMNS_LOG2,
            y: row >> TILE_ROWS_LOG2,
        }
    }

    /// First (leftmost) column covered by this tile.
    pub const fn first_column(self) -> i64 {
        self.x << TILE_COLUMNS_LOG2
    }

    /// First (topmost) row covered by this tile.
    pub const fn first_row(self) -> i64 {
        self.y << TILE_ROWS_LOG2
    }

    /// Inclusive cell range covered by this tile.
    pub const fn cell_rect(self) -> CellRect {
        let min_column = self.first_column();
        let min_row = self.first_row();
        CellRect {
            min_column,
            min_row,
            max_column: min_column + TILE_COLUMNS - 1,
            max_row: min_row + TILE_ROWS - 1,
        }
    }
}

/// Inclusive rectangle in cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub min_column: i64,
    pub min_row: i64,
    pub max_column: i64,
    pub max_row: i64,
}

impl CellRect {
    pub const fn contains(&self, column: i64, row: i64) -> bool {
        column >= self.min_column
            && column <= self.max_column
            && row >= self.min_row
            && row <= self.max_row
    }
}

/// Axis-aligned rectangle in sheet-space (world) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WorldRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn intersects(&self, other: &WorldRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_mapping_floors_negative_cells() {
        assert_eq!(TilePos::containing(0, 0), TilePos::new(0, 0));
        assert_eq!(TilePos::containing(7, 31), TilePos::new(0, 0));
        assert_eq!(TilePos::containing(8, 32), TilePos::new(1, 1));
        assert_eq!(TilePos::containing(-1, -1), TilePos::new(-1, -1));
        assert_eq!(TilePos::containing(-8, -32), TilePos::new(-1, -1));
        assert_eq!(TilePos::containing(-9, -33), TilePos::new(-2, -2));
    }

    #[test]
    fn tile_shift_matches_euclidean_division() {
        for cell in [-12345i64, -33, -9, -1, 0, 7, 8, 31, 32, 12345] {
            assert_eq!(
                TilePos::containing(cell, cell),
                TilePos::new(cell.div_euclid(TILE_COLUMNS), cell.div_euclid(TILE_ROWS)),
            );
        }
    }

    #[test]
    fn tile_cell_rect_covers_exactly_one_block() {
        let rect = TilePos::new(0, 0).cell_rect();
        assert_eq!(rect.min_column, 0);
        assert_eq!(rect.max_column, TILE_COLUMNS - 1);
        assert_eq!(rect.min_row, 0);
        assert_eq!(rect.max_row, TILE_ROWS - 1);

        let negative = TilePos::new(-1, -1).cell_rect();
        assert_eq!(negative.min_column, -TILE_COLUMNS);
        assert_eq!(negative.max_column, -1);
        assert!(negative.contains(-1, -1));
        assert!(!negative.contains(0, 0));
    }

    #[test]
    fn world_rect_intersection_is_exclusive_at_edges() {
        let a = WorldRect::new(0.0, 0.0, 800.0, 600.0);
        let b = WorldRect::new(800.0, 0.0, 800.0, 600.0);
        let c = WorldRect::new(799.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(b.intersects(&c));
    }
}
