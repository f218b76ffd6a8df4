use std::sync::Arc;

use geobatch_core::CellRange;

/// Grid error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("sheet not found: {0}")]
    SheetNotFound(String),
    #[error("invalid cell address: row {row}, column {column}")]
    InvalidAddress { row: u32, column: u32 },
    #[error("malformed sheet '{sheet}': {reason}")]
    Malformed { sheet: String, reason: String },
    #[error("storage error: {0}")]
    Storage(String),
}

impl GridError {
    /// True when the sheet itself is gone (as opposed to an I/O hiccup).
    pub fn is_not_found(&self) -> bool {
        matches!(self, GridError::SheetNotFound(_))
    }
}

/// Cell-addressed access to named sheets.
///
/// Cells hold text; an empty string means an empty cell. Writes may be
/// buffered until `flush`, which must make every earlier write durable.
pub trait Grid: Send + Sync {
    /// Confirm `sheet` exists and `range` can be addressed in it.
    fn resolve(&self, sheet: &str, range: &CellRange) -> Result<(), GridError>;

    fn read(&self, sheet: &str, row: u32, column: u32) -> Result<String, GridError>;

    fn write(&self, sheet: &str, row: u32, column: u32, value: &str) -> Result<(), GridError>;

    fn flush(&self, _sheet: &str) -> Result<(), GridError> {
        Ok(())
    }
}

impl<G> Grid for Arc<G>
where
    G: Grid + ?Sized,
{
    fn resolve(&self, sheet: &str, range: &CellRange) -> Result<(), GridError> {
        (**self).resolve(sheet, range)
    }

    fn read(&self, sheet: &str, row: u32, column: u32) -> Result<String, GridError> {
        (**self).read(sheet, row, column)
    }

    fn write(&self, sheet: &str, row: u32, column: u32, value: &str) -> Result<(), GridError> {
        (**self).write(sheet, row, column, value)
    }

    fn flush(&self, sheet: &str) -> Result<(), GridError> {
        (**self).flush(sheet)
    }
}

pub(crate) fn check_address(row: u32, column: u32) -> Result<(), GridError> {
    if row == 0 || column == 0 {
        return Err(GridError::InvalidAddress { row, column });
    }
    Ok(())
}
