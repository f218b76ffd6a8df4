//! Single-pass conversion without checkpoints.
//!
//! Walks every row once with one attempt per row. Nothing is persisted except
//! the dataset itself, so an interrupted pass has to be started over.

use std::time::{Duration, Instant};

use tracing::info;

use geobatch_core::RegionCode;
use geobatch_grid::Grid;

use crate::checkpoint::DatasetRef;
use crate::error::EngineError;
use crate::pacing::{Pacer, RowPacing};
use crate::processor::{Direction, RecordProcessor};
use crate::status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnboundedReport {
    pub processed: u32,
    pub errors: u32,
    pub elapsed: Duration,
}

/// `processor` should carry `RetryPolicy::no_retry()`.
pub fn run_unbounded(
    grid: &dyn Grid,
    processor: &RecordProcessor,
    pacer: &dyn Pacer,
    row_pacing: RowPacing,
    direction: Direction,
    dataset: &DatasetRef,
    region: &RegionCode,
) -> Result<UnboundedReport, EngineError> {
    let started = Instant::now();
    let total = dataset.range.rows();
    let (mut processed, mut errors) = (0u32, 0u32);

    info!(dataset = %dataset, total_rows = total, "unbounded pass started");
    for row in 1..=total {
        if row > 1 {
            pacer.pause(row_pacing.next_pause());
        }
        let outcome = processor.process(row, dataset, direction, region)?;
        processed += 1;
        if outcome.is_error() {
            errors += 1;
        }
    }

    let elapsed = started.elapsed();
    let (status_row, status_column) = dataset.status_cell()?;
    grid.write(
        &dataset.sheet,
        status_row,
        status_column,
        &status::completion_message(direction, processed, errors, elapsed),
    )?;
    grid.flush(&dataset.sheet)?;

    info!(processed, errors, elapsed_secs = elapsed.as_secs(), "unbounded pass finished");
    Ok(UnboundedReport {
        processed,
        errors,
        elapsed,
    })
}
