//! Rectangular cell ranges in A1 notation (`B2:D120`).
//!
//! Rows and columns are 1-based sheet coordinates. A range is serialized as its
//! A1 string so persisted job state stays readable.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A non-empty rectangular block of cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRange {
    first_row: u32,
    first_column: u32,
    rows: u32,
    columns: u32,
}

impl CellRange {
    /// Build a range from its top-left corner and size.
    pub fn new(first_row: u32, first_column: u32, rows: u32, columns: u32) -> DomainResult<Self> {
        let describe = || format!("r{first_row}c{first_column} {rows}x{columns}");
        if first_row == 0 || first_column == 0 {
            return Err(DomainError::invalid_range(describe(), "rows and columns are 1-based"));
        }
        if rows == 0 || columns == 0 {
            return Err(DomainError::invalid_range(describe(), "range must not be empty"));
        }
        if first_row.checked_add(rows - 1).is_none()
            || first_column.checked_add(columns - 1).is_none()
        {
            return Err(DomainError::invalid_range(describe(), "range overflows the sheet"));
        }
        Ok(Self {
            first_row,
            first_column,
            rows,
            columns,
        })
    }

    pub fn first_row(&self) -> u32 {
        self.first_row
    }

    pub fn first_column(&self) -> u32 {
        self.first_column
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn last_row(&self) -> u32 {
        self.first_row + (self.rows - 1)
    }

    pub fn last_column(&self) -> u32 {
        self.first_column + (self.columns - 1)
    }

    /// Sheet row of the 1-based `offset`-th row inside this range.
    pub fn sheet_row(&self, offset: u32) -> u32 {
        self.first_row + (offset - 1)
    }

    /// Sheet column of the 1-based `offset`-th column inside this range.
    pub fn sheet_column(&self, offset: u32) -> u32 {
        self.first_column + (offset - 1)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            column_letters(self.first_column),
            self.first_row,
            column_letters(self.last_column()),
            self.last_row()
        )
    }
}

impl FromStr for CellRange {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (start, end) = match trimmed.split_once(':') {
            Some((a, b)) => (a, b),
            None => (trimmed, trimmed),
        };

        let (r1, c1) = parse_cell(start).map_err(|reason| DomainError::invalid_range(s, reason))?;
        let (r2, c2) = parse_cell(end).map_err(|reason| DomainError::invalid_range(s, reason))?;

        // Accept corners in any order, like spreadsheets do.
        let (top, bottom) = (r1.min(r2), r1.max(r2));
        let (left, right) = (c1.min(c2), c1.max(c2));

        CellRange::new(top, left, bottom - top + 1, right - left + 1)
            .map_err(|_| DomainError::invalid_range(s, "range is out of bounds"))
    }
}

impl TryFrom<String> for CellRange {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRange> for String {
    fn from(value: CellRange) -> Self {
        value.to_string()
    }
}

/// Column number (1-based) to spreadsheet letters: 1 → A, 27 → AA.
pub fn column_letters(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn parse_cell(cell: &str) -> Result<(u32, u32), String> {
    let cell = cell.trim().replace('$', "");
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| format!("'{cell}' has no row number"))?;
    let (letters, digits) = cell.split_at(split);

    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("'{cell}' has no column letters"));
    }

    let mut column: u32 = 0;
    for c in letters.chars() {
        let value = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        column = column
            .checked_mul(26)
            .and_then(|v| v.checked_add(value))
            .ok_or_else(|| format!("column '{letters}' is too large"))?;
    }

    let row: u32 = digits
        .parse()
        .map_err(|_| format!("'{digits}' is not a row number"))?;
    if row == 0 {
        return Err("row numbers start at 1".to_string());
    }

    Ok((row, column))
}
