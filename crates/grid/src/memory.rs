use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use geobatch_core::CellRange;

use crate::grid::{check_address, Grid, GridError};

type Sheet = BTreeMap<(u32, u32), String>;

/// In-memory grid for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryGrid {
    sheets: RwLock<HashMap<String, Sheet>>,
}

impl InMemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty sheet (no-op if it exists).
    pub fn with_sheet(self, name: impl Into<String>) -> Self {
        self.add_sheet(name);
        self
    }

    pub fn add_sheet(&self, name: impl Into<String>) {
        if let Ok(mut sheets) = self.sheets.write() {
            sheets.entry(name.into()).or_default();
        }
    }

    pub fn remove_sheet(&self, name: &str) {
        if let Ok(mut sheets) = self.sheets.write() {
            sheets.remove(name);
        }
    }

    /// Fill cells row by row starting at (`first_row`, `first_column`).
    pub fn with_rows(
        self,
        sheet: &str,
        first_row: u32,
        first_column: u32,
        rows: &[&[&str]],
    ) -> Self {
        self.add_sheet(sheet);
        for (r, cells) in rows.iter().enumerate() {
            for (c, value) in cells.iter().enumerate() {
                self.set(sheet, first_row + r as u32, first_column + c as u32, value);
            }
        }
        self
    }

    pub fn set(&self, sheet: &str, row: u32, column: u32, value: &str) {
        if let Ok(mut sheets) = self.sheets.write() {
            sheets
                .entry(sheet.to_string())
                .or_default()
                .insert((row, column), value.to_string());
        }
    }

    /// Cell value, `None` when the cell was never written.
    pub fn get(&self, sheet: &str, row: u32, column: u32) -> Option<String> {
        let sheets = self.sheets.read().ok()?;
        sheets.get(sheet)?.get(&(row, column)).cloned()
    }
}

impl Grid for InMemoryGrid {
    fn resolve(&self, sheet: &str, _range: &CellRange) -> Result<(), GridError> {
        let sheets = self
            .sheets
            .read()
            .map_err(|_| GridError::Storage("grid lock poisoned".to_string()))?;
        if sheets.contains_key(sheet) {
            Ok(())
        } else {
            Err(GridError::SheetNotFound(sheet.to_string()))
        }
    }

    fn read(&self, sheet: &str, row: u32, column: u32) -> Result<String, GridError> {
        check_address(row, column)?;
        let sheets = self
            .sheets
            .read()
            .map_err(|_| GridError::Storage("grid lock poisoned".to_string()))?;
        let cells = sheets
            .get(sheet)
            .ok_or_else(|| GridError::SheetNotFound(sheet.to_string()))?;
        Ok(cells.get(&(row, column)).cloned().unwrap_or_default())
    }

    fn write(&self, sheet: &str, row: u32, column: u32, value: &str) -> Result<(), GridError> {
        check_address(row, column)?;
        let mut sheets = self
            .sheets
            .write()
            .map_err(|_| GridError::Storage("grid lock poisoned".to_string()))?;
        let cells = sheets
            .get_mut(sheet)
            .ok_or_else(|| GridError::SheetNotFound(sheet.to_string()))?;
        cells.insert((row, column), value.to_string());
        Ok(())
    }
}
