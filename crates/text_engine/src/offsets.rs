//! Column/row geometry for one sheet.
//!
//! Every line starts at its default size; interactive resizes arrive as
//! transient overrides keyed by line index. Positions are derived on demand
//! from the override maps, so the structure stays O(overrides) regardless of
//! how far the sheet scrolls in either direction.

use std::collections::HashMap;

use render_protocol::{
    DEFAULT_COLUMN_WIDTH, DEFAULT_ROW_HEIGHT, TILE_COLUMNS, TILE_ROWS, TilePos, WorldRect,
};

#[derive(Debug, Clone, Default)]
pub struct SheetOffsets {
    transient_columns: HashMap<i64, f64>,
    transient_rows: HashMap<i64, f64>,
}

impl SheetOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column_width(&self, column: i64) -> f64 {
        *self
            .transient_columns
            .get(&column)
            .unwrap_or(&DEFAULT_COLUMN_WIDTH)
    }

    pub fn row_height(&self, row: i64) -> f64 {
        *self.transient_rows.get(&row).unwrap_or(&DEFAULT_ROW_HEIGHT)
    }

    /// Install the live drag value for a column. A later transient for the
    /// same column replaces this one.
    pub fn set_transient_column_width(&mut self, column: i64, size: f64) {
        if let Some(size) = sanitize_size(size) {
            self.transient_columns.insert(column, size);
        } else {
            log::warn!("ignoring non-finite transient width {size} for column {column}");
        }
    }

    pub fn set_transient_row_height(&mut self, row: i64, size: f64) {
        if let Some(size) = sanitize_size(size) {
            self.transient_rows.insert(row, size);
        } else {
            log::warn!("ignoring non-finite transient height {size} for row {row}");
        }
    }

    /// World x of the column's left edge. Column 0 starts at 0; negative
    /// columns extend into negative world space.
    pub fn column_position(&self, column: i64) -> f64 {
        axis_position(column, DEFAULT_COLUMN_WIDTH, &self.transient_columns)
    }

    pub fn row_position(&self, row: i64) -> f64 {
        axis_position(row, DEFAULT_ROW_HEIGHT, &self.transient_rows)
    }

    /// Column whose span `[left, left + width)` contains the world x.
    pub fn column_at(&self, x: f64) -> i64 {
        axis_at(x, DEFAULT_COLUMN_WIDTH, &self.transient_columns)
    }

    pub fn row_at(&self, y: f64) -> i64 {
        axis_at(y, DEFAULT_ROW_HEIGHT, &self.transient_rows)
    }

    /// World-space footprint of a tile's cell block under the current sizes.
    pub fn tile_view_rect(&self, tile: TilePos) -> WorldRect {
        let first_column = tile.first_column();
        let first_row = tile.first_row();
        let x = self.column_position(first_column);
        let y = self.row_position(first_row);
        WorldRect {
            x,
            y,
            width: self.column_position(first_column + TILE_COLUMNS) - x,
            height: self.row_position(first_row + TILE_ROWS) - y,
        }
    }
}

fn sanitize_size(size: f64) -> Option<f64> {
    size.is_finite().then(|| size.max(0.0))
}

fn axis_position(target: i64, default: f64, overrides: &HashMap<i64, f64>) -> f64 {
    let mut position = target as f64 * default;
    for (&line, &size) in overrides {
        if (0..target).contains(&line) {
            position += size - default;
        } else if (target..0).contains(&line) {
            position -= size - default;
        }
    }
    position
}

fn axis_at(x: f64, default: f64, overrides: &HashMap<i64, f64>) -> i64 {
    // Never step line by line: far from the origin one default size falls
    // below one ulp of the position, so a unit walk stops advancing. The
    // axis is uniform between overrides, which keeps every span a single
    // division away.
    if overrides.is_empty() {
        return uniform_line_at(0, 0.0, x, default);
    }
    let mut lines: Vec<(i64, f64)> = overrides.iter().map(|(&line, &size)| (line, size)).collect();
    lines.sort_unstable_by_key(|&(line, _)| line);

    let mut position = axis_position(lines[0].0, default, overrides);
    if x < position {
        // Uniform region below the lowest override.
        return uniform_line_at(lines[0].0, position, x, default);
    }
    for pair in lines.windows(2) {
        let (line, size) = pair[0];
        let (next, _) = pair[1];
        if x < position + size {
            return line;
        }
        let end = position + size;
        let next_position = end + (next as f64 - line as f64 - 1.0) * default;
        if x < next_position {
            // Uniform run between two overrides.
            return uniform_line_at(line + 1, end, x, default);
        }
        position = next_position;
    }
    let (last, size) = lines[lines.len() - 1];
    if x < position + size {
        return last;
    }
    uniform_line_at(last + 1, position + size, x, default)
}

/// Line containing `x` in a run of default-sized lines whose leftmost line
/// is `anchor` with its left edge at `anchor_position`. Saturates once the
/// coordinate runs past the index range.
fn uniform_line_at(anchor: i64, anchor_position: f64, x: f64, default: f64) -> i64 {
    anchor.saturating_add(((x - anchor_position) / default).floor() as i64)
}
