//! Job state persisted between slices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use geobatch_core::{CellRange, DomainError, JobId};

use crate::processor::Direction;

/// What the active job does, or `Idle` when no job exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    #[default]
    Idle,
    AddressToPosition,
    PositionToAddress,
}

impl JobMode {
    pub fn direction(self) -> Option<Direction> {
        match self {
            JobMode::Idle => None,
            JobMode::AddressToPosition => Some(Direction::Forward),
            JobMode::PositionToAddress => Some(Direction::Reverse),
        }
    }
}

impl From<Direction> for JobMode {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Forward => JobMode::AddressToPosition,
            Direction::Reverse => JobMode::PositionToAddress,
        }
    }
}

/// Where a job's rows live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub sheet: String,
    pub range: CellRange,
}

impl DatasetRef {
    pub fn new(sheet: impl Into<String>, range: CellRange) -> Self {
        Self {
            sheet: sheet.into(),
            range,
        }
    }

    /// Sheet cell that receives progress and completion messages: row 1,
    /// region width + 4 columns from the region's first column.
    pub fn status_cell(&self) -> Result<(u32, u32), DomainError> {
        self.range
            .first_column()
            .checked_add(self.range.columns())
            .and_then(|column| column.checked_add(4))
            .map(|column| (1, column))
            .ok_or_else(|| {
                DomainError::invalid_range(
                    self.range.to_string(),
                    "no room for the status cell right of the region",
                )
            })
    }
}

impl core::fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}!{}", self.sheet, self.range)
    }
}

/// The single persisted job record.
///
/// `current_row` is a 1-based offset into the region: the next row to process.
/// All rows before it have been attempted and their outputs written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub mode: JobMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetRef>,
    pub current_row: u32,
    pub total_rows: u32,
    pub processed_count: u32,
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self::idle()
    }
}

impl JobState {
    pub fn idle() -> Self {
        Self {
            job_id: None,
            mode: JobMode::Idle,
            dataset: None,
            current_row: 1,
            total_rows: 0,
            processed_count: 0,
            error_count: 0,
            started_at: None,
        }
    }

    /// Fresh state for a new job over the whole `dataset` region.
    pub fn start(direction: Direction, dataset: DatasetRef, now: DateTime<Utc>) -> Self {
        let total_rows = dataset.range.rows();
        Self {
            job_id: Some(JobId::new()),
            mode: direction.into(),
            dataset: Some(dataset),
            current_row: 1,
            total_rows,
            processed_count: 0,
            error_count: 0,
            started_at: Some(now),
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode != JobMode::Idle
    }

    /// Every row has been attempted.
    pub fn is_exhausted(&self) -> bool {
        self.current_row > self.total_rows
    }

    pub fn remaining_rows(&self) -> u32 {
        (self.total_rows + 1).saturating_sub(self.current_row)
    }

    /// Last row of the next slice: `min(current + batch - 1, total)`.
    pub fn slice_end(&self, batch_size: u32) -> u32 {
        self.current_row
            .saturating_add(batch_size.max(1) - 1)
            .min(self.total_rows)
    }

    /// Count one attempted row and advance the cursor past it.
    pub fn record_row(&mut self, errored: bool) {
        self.processed_count = self.processed_count.saturating_add(1);
        if errored {
            self.error_count = self.error_count.saturating_add(1);
        }
        self.current_row = self.current_row.saturating_add(1);
    }

    /// Structural check for state read back from storage.
    pub fn validate(&self) -> Result<(), String> {
        if !self.is_active() {
            return Ok(());
        }
        let Some(dataset) = &self.dataset else {
            return Err("active job has no dataset".to_string());
        };
        if self.started_at.is_none() {
            return Err("active job has no start time".to_string());
        }
        if self.total_rows != dataset.range.rows() {
            return Err(format!(
                "total_rows {} does not match range {}",
                self.total_rows, dataset.range
            ));
        }
        if self.current_row == 0 || self.current_row > self.total_rows + 1 {
            return Err(format!(
                "cursor {} outside 1..={}",
                self.current_row,
                self.total_rows + 1
            ));
        }
        if self.error_count > self.processed_count {
            return Err("more errors than processed rows".to_string());
        }
        Ok(())
    }
}
