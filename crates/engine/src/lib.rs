//! `geobatch-engine`: resumable, checkpointed batch geocoding.
//!
//! ## Design
//!
//! - A job walks a 3-column region of a sheet in bounded slices
//! - Each slice is one invocation: process rows, flush, checkpoint, then either
//!   arm a continuation or finalize
//! - Per-row retry/backoff against a rate-limited lookup service
//! - State lives in an injected key-value store, never in process memory
//!
//! ## Components
//!
//! - `RetryPolicy`: whether/when to retry one lookup
//! - `RecordProcessor`: one row in, values or an error marker out
//! - `BatchRunner`: one slice, one checkpoint write
//! - `CheckpointStore`: the durable job state slot
//! - `ContinuationScheduler`: at most one pending resume
//! - `JobController`: start / resume / reset entry points

pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod error;
pub mod legacy;
pub mod pacing;
pub mod processor;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod settings;
pub mod status;

mod integration_tests;

pub use checkpoint::{
    CheckpointStore, DatasetRef, FileKeyValueStore, InMemoryKeyValueStore, JobMode, JobState,
    KeyValueStore, StoreError,
};
#[cfg(feature = "sqlite")]
pub use checkpoint::SqliteKeyValueStore;
pub use config::EngineConfig;
pub use controller::{JobController, ResumeOutcome};
pub use error::EngineError;
pub use legacy::UnboundedReport;
pub use pacing::{Pacer, RecordingPacer, RowPacing, ThreadPacer};
pub use processor::{Direction, RecordOutcome, RecordProcessor};
pub use retry::{AttemptBudget, AttemptClass, BackoffStrategy, RetryDecision, RetryPolicy};
pub use runner::{BatchRunner, CompletionSummary, SliceCounts, SliceNext, SliceReport};
pub use scheduler::{
    ArmedContinuation, ContinuationScheduler, InMemoryScheduler, PersistentScheduler,
    SchedulerError, SchedulerEvent,
};
pub use settings::RegionSettings;
