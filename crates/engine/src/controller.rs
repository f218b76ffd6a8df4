//! Entry points: start, resume, reset.
//!
//! Every entry point is one short invocation. A job advances one slice per
//! invocation and relies on the continuation scheduler for the next one.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use geobatch_core::{JobId, RegionCode};
use geobatch_geocode::Geocoder;
use geobatch_grid::Grid;

use crate::checkpoint::{CheckpointStore, DatasetRef, JobMode, JobState, KeyValueStore, StoreError};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::legacy::{self, UnboundedReport};
use crate::pacing::{Pacer, ThreadPacer};
use crate::processor::{Direction, RecordProcessor};
use crate::retry::RetryPolicy;
use crate::runner::{BatchRunner, SliceReport};
use crate::scheduler::ContinuationScheduler;
use crate::settings::RegionSettings;

/// Result of a scheduled resume.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// No active job; the trigger was stray.
    Idle,
    /// The job could not continue and was cleared.
    Abandoned {
        job_id: Option<JobId>,
        reason: String,
    },
    Ran(SliceReport),
}

pub struct JobController {
    config: EngineConfig,
    checkpoint: CheckpointStore,
    settings: RegionSettings,
    scheduler: Arc<dyn ContinuationScheduler>,
    grid: Arc<dyn Grid>,
    geocoder: Arc<dyn Geocoder>,
    pacer: Arc<dyn Pacer>,
}

impl JobController {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        scheduler: Arc<dyn ContinuationScheduler>,
        grid: Arc<dyn Grid>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let settings = RegionSettings::new(store.clone(), config.default_region.clone());
        Self {
            checkpoint: CheckpointStore::new(store),
            settings,
            scheduler,
            grid,
            geocoder,
            pacer: Arc::new(ThreadPacer),
            config,
        }
    }

    /// Replace the real sleeping pacer (tests, benches).
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Start a new job over `dataset`, replacing any existing one, and run its
    /// first slice.
    pub fn start(&self, mode: JobMode, dataset: DatasetRef) -> Result<SliceReport, EngineError> {
        let direction = direction_of(mode)?;
        self.check_selection(&dataset)?;

        self.scheduler.disarm()?;
        self.checkpoint.clear()?;

        let state = JobState::start(direction, dataset, Utc::now());
        self.checkpoint.save(&state)?;
        info!(
            job_id = ?state.job_id,
            mode = ?state.mode,
            total_rows = state.total_rows,
            batch_size = self.config.batch_size,
            worst_case_slice_secs = self.config.worst_case_slice().as_secs(),
            "job started"
        );

        self.drive(state)
    }

    /// Run the next slice of the active job, if any.
    pub fn resume(&self) -> Result<ResumeOutcome, EngineError> {
        let state = match self.checkpoint.load() {
            Ok(state) => state,
            Err(StoreError::Corrupt { key, reason }) => {
                warn!(%key, %reason, "abandoning unreadable job state");
                return self.abandon(None, reason);
            }
            Err(err) => {
                // The fired continuation is spent; a live job would be stranded.
                let err = EngineError::from(err);
                self.rearm_after(None, &err);
                return Err(err);
            }
        };

        if !state.is_active() {
            debug!("resume fired with no active job");
            return Ok(ResumeOutcome::Idle);
        }

        let Some(dataset) = state.dataset.clone() else {
            return self.abandon(state.job_id, "job has no dataset".to_string());
        };
        match self.grid.resolve(&dataset.sheet, &dataset.range) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                warn!(
                    job_id = ?state.job_id,
                    dataset = %dataset,
                    "dataset is gone, abandoning job"
                );
                return self.abandon(state.job_id, err.to_string());
            }
            Err(err) => {
                let err = EngineError::from(err);
                self.rearm_after(state.job_id, &err);
                return Err(err);
            }
        }

        self.drive(state).map(ResumeOutcome::Ran)
    }

    /// Disarm any continuation and clear the job. Safe with or without a job.
    pub fn reset(&self) -> Result<(), EngineError> {
        self.scheduler.disarm()?;
        self.checkpoint.clear()?;
        info!("job state reset");
        Ok(())
    }

    /// Current job state (idle when no job is active).
    pub fn status(&self) -> Result<JobState, EngineError> {
        Ok(self.checkpoint.load()?)
    }

    pub fn region(&self) -> Result<RegionCode, EngineError> {
        Ok(self.settings.get()?)
    }

    /// Validate and persist the region bias used by every later lookup.
    pub fn set_region(&self, code: &str) -> Result<RegionCode, EngineError> {
        let region: RegionCode = code.parse()?;
        self.settings.set(&region)?;
        Ok(region)
    }

    /// Convert every row of `dataset` in one go: one attempt per row, no
    /// checkpoint, no continuation. Meant for small selections.
    pub fn run_unbounded(
        &self,
        mode: JobMode,
        dataset: &DatasetRef,
    ) -> Result<UnboundedReport, EngineError> {
        let direction = direction_of(mode)?;
        self.check_selection(dataset)?;
        let region = self.region()?;

        let processor = RecordProcessor::new(
            self.grid.clone(),
            self.geocoder.clone(),
            self.pacer.clone(),
            RetryPolicy::no_retry(),
        );
        legacy::run_unbounded(
            self.grid.as_ref(),
            &processor,
            self.pacer.as_ref(),
            self.config.row_pacing,
            direction,
            dataset,
            &region,
        )
    }

    fn runner(&self) -> BatchRunner {
        let processor = RecordProcessor::new(
            self.grid.clone(),
            self.geocoder.clone(),
            self.pacer.clone(),
            self.config.retry.clone(),
        );
        BatchRunner::new(
            self.checkpoint.clone(),
            self.scheduler.clone(),
            self.grid.clone(),
            processor,
            self.pacer.clone(),
            self.config.row_pacing,
            self.config.batch_size,
            self.config.continuation_delay,
        )
    }

    /// Run one slice; an aborted slice of a live job gets a new continuation
    /// so it is retried from the last checkpoint.
    fn drive(&self, state: JobState) -> Result<SliceReport, EngineError> {
        let job_id = state.job_id;
        let result = self
            .region()
            .and_then(|region| self.runner().run_slice(state, &region));
        if let Err(err) = &result {
            self.rearm_after(job_id, err);
        }
        result
    }

    fn rearm_after(&self, job_id: Option<JobId>, err: &EngineError) {
        error!(job_id = ?job_id, error = %err, "slice aborted");
        let job_id = job_id.unwrap_or_default();
        if let Err(arm_err) = self.scheduler.arm(job_id, self.config.continuation_delay) {
            error!(%job_id, error = %arm_err, "failed to re-arm continuation");
        }
    }

    fn abandon(
        &self,
        job_id: Option<JobId>,
        reason: String,
    ) -> Result<ResumeOutcome, EngineError> {
        if let Err(err) = self.reset() {
            self.rearm_after(job_id, &err);
            return Err(err);
        }
        Ok(ResumeOutcome::Abandoned { job_id, reason })
    }

    fn check_selection(&self, dataset: &DatasetRef) -> Result<(), EngineError> {
        let columns = dataset.range.columns();
        if columns != 3 {
            return Err(EngineError::configuration(format!(
                "select exactly 3 columns (address, latitude, longitude); {} has {columns}",
                dataset.range
            )));
        }
        dataset.status_cell()?;
        match self.grid.resolve(&dataset.sheet, &dataset.range) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Err(EngineError::configuration(err.to_string())),
            Err(err) => Err(err.into()),
        }
    }
}

fn direction_of(mode: JobMode) -> Result<Direction, EngineError> {
    mode.direction()
        .ok_or_else(|| EngineError::configuration("a job needs a direction, not idle"))
}
