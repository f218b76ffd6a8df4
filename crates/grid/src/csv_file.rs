//! CSV files as sheets.
//!
//! A sheet name is a path relative to the grid's root directory. The first line
//! of the file is sheet row 1 (no header handling). Writes are buffered per
//! sheet and `flush` replaces the file atomically.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use geobatch_core::CellRange;
use tracing::debug;

use crate::grid::{check_address, Grid, GridError};

#[derive(Debug, Default)]
struct LoadedSheet {
    rows: Vec<Vec<String>>,
    dirty: bool,
}

impl LoadedSheet {
    fn get(&self, row: u32, column: u32) -> String {
        self.rows
            .get(row as usize - 1)
            .and_then(|cells| cells.get(column as usize - 1))
            .cloned()
            .unwrap_or_default()
    }

    fn set(&mut self, row: u32, column: u32, value: &str) {
        let (r, c) = (row as usize - 1, column as usize - 1);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, String::new());
        }
        cells[c] = value.to_string();
        self.dirty = true;
    }
}

/// Grid backed by CSV files under a root directory.
#[derive(Debug)]
pub struct CsvGrid {
    root: PathBuf,
    sheets: Mutex<HashMap<String, LoadedSheet>>,
}

impl CsvGrid {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sheets: Mutex::new(HashMap::new()),
        }
    }

    fn path_of(&self, sheet: &str) -> PathBuf {
        self.root.join(sheet)
    }

    fn with_sheet<T>(
        &self,
        sheet: &str,
        f: impl FnOnce(&mut LoadedSheet) -> T,
    ) -> Result<T, GridError> {
        let mut sheets = self
            .sheets
            .lock()
            .map_err(|_| GridError::Storage("csv grid lock poisoned".to_string()))?;

        if !sheets.contains_key(sheet) {
            let loaded = load(sheet, &self.path_of(sheet))?;
            sheets.insert(sheet.to_string(), loaded);
        }

        let loaded = sheets
            .get_mut(sheet)
            .ok_or_else(|| GridError::SheetNotFound(sheet.to_string()))?;
        Ok(f(loaded))
    }
}

impl Grid for CsvGrid {
    fn resolve(&self, sheet: &str, _range: &CellRange) -> Result<(), GridError> {
        // A cached sheet whose file vanished is still gone.
        if !self.path_of(sheet).is_file() {
            return Err(GridError::SheetNotFound(sheet.to_string()));
        }
        self.with_sheet(sheet, |_| ())
    }

    fn read(&self, sheet: &str, row: u32, column: u32) -> Result<String, GridError> {
        check_address(row, column)?;
        self.with_sheet(sheet, |s| s.get(row, column))
    }

    fn write(&self, sheet: &str, row: u32, column: u32, value: &str) -> Result<(), GridError> {
        check_address(row, column)?;
        self.with_sheet(sheet, |s| s.set(row, column, value))
    }

    fn flush(&self, sheet: &str) -> Result<(), GridError> {
        let mut sheets = self
            .sheets
            .lock()
            .map_err(|_| GridError::Storage("csv grid lock poisoned".to_string()))?;

        let Some(loaded) = sheets.get_mut(sheet) else {
            return Ok(());
        };
        if !loaded.dirty {
            return Ok(());
        }

        let path = self.path_of(sheet);
        persist(&path, &loaded.rows)?;
        loaded.dirty = false;
        debug!(sheet, rows = loaded.rows.len(), "flushed csv sheet");
        Ok(())
    }
}

fn load(sheet: &str, path: &Path) -> Result<LoadedSheet, GridError> {
    if !path.is_file() {
        return Err(GridError::SheetNotFound(sheet.to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| GridError::Storage(format!("failed to open {}: {e}", path.display())))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| GridError::Malformed {
            sheet: sheet.to_string(),
            reason: e.to_string(),
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(LoadedSheet { rows, dirty: false })
}

fn persist(path: &Path, rows: &[Vec<String>]) -> Result<(), GridError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let storage =
        |e: std::io::Error| GridError::Storage(format!("failed to write {}: {e}", path.display()));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(tmp.as_file_mut());
        for row in rows {
            writer
                .write_record(row)
                .map_err(|e| GridError::Storage(e.to_string()))?;
        }
        writer.flush().map_err(storage)?;
    }
    tmp.as_file_mut().flush().map_err(storage)?;
    tmp.as_file().sync_all().map_err(storage)?;
    tmp.persist(path).map_err(|e| storage(e.error))?;
    Ok(())
}
