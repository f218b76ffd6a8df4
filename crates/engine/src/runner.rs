//! One bounded slice of a job.
//!
//! Order within a slice is fixed: process rows, flush the dataset, save the
//! checkpoint, then arm the next slice or finalize. A crash anywhere before the
//! save leaves the previous checkpoint in place, so the slice is redone.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use geobatch_core::{JobId, RegionCode};
use geobatch_grid::Grid;

use crate::checkpoint::{CheckpointStore, DatasetRef, JobState};
use crate::error::EngineError;
use crate::pacing::{Pacer, RowPacing};
use crate::processor::{Direction, RecordOutcome, RecordProcessor};
use crate::scheduler::ContinuationScheduler;
use crate::status;

/// Per-outcome counts for one slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceCounts {
    pub succeeded: u32,
    pub service_errors: u32,
    pub transient_failures: u32,
    pub skipped: u32,
}

impl SliceCounts {
    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Success(_) => self.succeeded += 1,
            RecordOutcome::ServiceError(_) => self.service_errors += 1,
            RecordOutcome::TransientFailure(_) => self.transient_failures += 1,
            RecordOutcome::SkippedEmpty => self.skipped += 1,
        }
    }

    pub fn rows(&self) -> u32 {
        self.succeeded + self.service_errors + self.transient_failures + self.skipped
    }

    pub fn errors(&self) -> u32 {
        self.service_errors + self.transient_failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSummary {
    pub processed: u32,
    pub errors: u32,
    pub elapsed: Duration,
}

/// What happens after the slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceNext {
    /// A continuation is armed; the next slice starts at `next_row`.
    Continue { next_row: u32, after: Duration },
    /// The job finished and state is back to idle.
    Completed(CompletionSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceReport {
    pub job_id: Option<JobId>,
    /// First and last region rows handled; `None` when no row was left.
    pub rows: Option<(u32, u32)>,
    pub counts: SliceCounts,
    /// Persisted state after the slice (idle once completed).
    pub state: JobState,
    pub next: SliceNext,
}

impl SliceReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.next, SliceNext::Completed(_))
    }
}

pub struct BatchRunner {
    checkpoint: CheckpointStore,
    scheduler: Arc<dyn ContinuationScheduler>,
    grid: Arc<dyn Grid>,
    processor: RecordProcessor,
    pacer: Arc<dyn Pacer>,
    row_pacing: RowPacing,
    batch_size: u32,
    continuation_delay: Duration,
}

impl BatchRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        checkpoint: CheckpointStore,
        scheduler: Arc<dyn ContinuationScheduler>,
        grid: Arc<dyn Grid>,
        processor: RecordProcessor,
        pacer: Arc<dyn Pacer>,
        row_pacing: RowPacing,
        batch_size: u32,
        continuation_delay: Duration,
    ) -> Self {
        Self {
            checkpoint,
            scheduler,
            grid,
            processor,
            pacer,
            row_pacing,
            batch_size: batch_size.max(1),
            continuation_delay,
        }
    }

    /// Run the next slice of the active job in `state`.
    ///
    /// On `Err` nothing past the last saved checkpoint is persisted; the caller
    /// decides whether to re-arm.
    pub fn run_slice(
        &self,
        mut state: JobState,
        region: &RegionCode,
    ) -> Result<SliceReport, EngineError> {
        let (direction, dataset) = match (state.mode.direction(), state.dataset.clone()) {
            (Some(direction), Some(dataset)) => (direction, dataset),
            _ => {
                return Err(EngineError::configuration(
                    "no active job to run a slice for",
                ));
            }
        };
        let job_id = state.job_id;

        let mut counts = SliceCounts::default();
        let rows = if state.is_exhausted() {
            None
        } else {
            let first = state.current_row;
            let last = state.slice_end(self.batch_size);
            info!(
                job_id = ?job_id,
                mode = ?state.mode,
                slice_start = first,
                slice_end = last,
                total_rows = state.total_rows,
                "slice started"
            );

            for row in first..=last {
                if row > first {
                    self.pacer.pause(self.row_pacing.next_pause());
                }
                let outcome = self.processor.process(row, &dataset, direction, region)?;
                debug!(row, ?outcome, "row processed");
                state.record_row(outcome.is_error());
                counts.record(&outcome);
            }

            // Outputs must be durable before the cursor moves past them.
            self.grid.flush(&dataset.sheet)?;
            self.checkpoint.save(&state)?;
            Some((first, last))
        };

        if state.is_exhausted() {
            let summary = self.finalize(&state, direction, &dataset)?;
            return Ok(SliceReport {
                job_id,
                rows,
                counts,
                state: JobState::idle(),
                next: SliceNext::Completed(summary),
            });
        }

        let armed_for = job_id.unwrap_or_default();
        self.scheduler.arm(armed_for, self.continuation_delay)?;
        self.write_status(
            &dataset,
            &status::progress_message(
                direction,
                state.processed_count,
                state.total_rows,
                state.error_count,
            ),
        )?;
        info!(
            job_id = ?job_id,
            next_row = state.current_row,
            processed = state.processed_count,
            errors = state.error_count,
            "slice finished, continuation armed"
        );

        Ok(SliceReport {
            job_id,
            rows,
            next: SliceNext::Continue {
                next_row: state.current_row,
                after: self.continuation_delay,
            },
            counts,
            state,
        })
    }

    fn finalize(
        &self,
        state: &JobState,
        direction: Direction,
        dataset: &DatasetRef,
    ) -> Result<CompletionSummary, EngineError> {
        let elapsed = state
            .started_at
            .map(|started| (Utc::now() - started).to_std().unwrap_or_default())
            .unwrap_or_default();
        let summary = CompletionSummary {
            processed: state.processed_count,
            errors: state.error_count,
            elapsed,
        };

        self.checkpoint.clear()?;
        self.scheduler.disarm()?;
        self.write_status(
            dataset,
            &status::completion_message(direction, summary.processed, summary.errors, elapsed),
        )?;
        info!(
            job_id = ?state.job_id,
            processed = summary.processed,
            errors = summary.errors,
            elapsed_secs = elapsed.as_secs(),
            "job completed"
        );
        Ok(summary)
    }

    fn write_status(&self, dataset: &DatasetRef, message: &str) -> Result<(), EngineError> {
        let (row, column) = dataset.status_cell()?;
        self.grid.write(&dataset.sheet, row, column, message)?;
        self.grid.flush(&dataset.sheet)?;
        Ok(())
    }
}
