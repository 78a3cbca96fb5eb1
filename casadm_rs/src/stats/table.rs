//! Growable string grid backing the text renderer.
//!
//! Rows and columns grow on demand when a cell beyond the current bounds is
//! set; reading an unset cell yields an empty string.

use super::RenderError;

/// Longest text accepted in a single cell.
pub const MAX_CELL_LEN: usize = 4096;

#[derive(Debug, Default, Clone)]
pub struct Grid {
    rows: Vec<Vec<String>>,
    width: usize,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Widen (or narrow) the logical width, e.g. to make room for
    /// continuation segments of broken cells.
    pub fn set_width(&mut self, width: usize) {
        self.width = width;
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) -> Result<(), RenderError> {
        let value = value.into();
        if value.len() >= MAX_CELL_LEN {
            return Err(RenderError::CellTooLong { len: value.len() });
        }
        if row >= self.rows.len() {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if col >= cells.len() {
            cells.resize_with(col + 1, String::new);
        }
        cells[col] = value;
        self.width = self.width.max(col + 1);
        Ok(())
    }

    /// Append a row holding `fields` in its leading columns.
    pub fn push_row(&mut self, fields: &[String]) -> Result<(), RenderError> {
        let row = self.rows.len();
        self.rows.push(Vec::with_capacity(fields.len()));
        for (col, field) in fields.iter().enumerate() {
            self.set(row, col, field.as_str())?;
        }
        Ok(())
    }

    /// True if any cell of `row` at or after `col` has content.
    pub fn has_content_from(&self, row: usize, col: usize) -> bool {
        self.rows
            .get(row)
            .is_some_and(|cells| cells.iter().skip(col).any(|c| !c.is_empty()))
    }

    pub fn reset(&mut self) {
        self.rows.clear();
        self.width = 0;
    }
}
