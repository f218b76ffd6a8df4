//! `geobatch` command line.
//!
//! Each subcommand is one short invocation against a state directory and a
//! directory of CSV sheets. Long jobs advance one slice per invocation; run
//! `geobatch worker` (or `geobatch run-due` from cron) to keep them moving.

pub mod app;
pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Resumable batch geocoding for CSV sheets
#[derive(Parser, Debug)]
#[command(name = "geobatch")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding job state and the pending continuation
    #[arg(long, env = "GEOBATCH_STATE_DIR", default_value = ".geobatch", global = true)]
    pub state_dir: PathBuf,

    /// Directory sheets are resolved against
    #[arg(long, env = "GEOBATCH_DATA_DIR", default_value = ".", global = true)]
    pub data_dir: PathBuf,

    /// State backend
    #[arg(
        long,
        env = "GEOBATCH_STORE",
        value_enum,
        default_value_t = StoreKind::Json,
        global = true
    )]
    pub store: StoreKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// `state.json` in the state directory
    Json,
    /// `state.db` in the state directory (needs the `sqlite` feature)
    Sqlite,
}

/// Rows to convert: a CSV file and an A1 range exactly 3 columns wide.
#[derive(clap::Args, Debug, Clone)]
pub struct Selection {
    /// CSV file, relative to the data directory
    #[arg(long)]
    pub sheet: String,

    /// Region such as `A2:C500` (address, latitude, longitude)
    #[arg(long)]
    pub range: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start converting addresses to coordinates (replaces any running job)
    StartForward(Selection),

    /// Start converting coordinates to addresses (replaces any running job)
    StartReverse(Selection),

    /// Run the next slice of the active job now
    Resume,

    /// Run the next slice if its continuation is due
    RunDue,

    /// Keep running slices as continuations come due, until none is armed
    Worker {
        /// Longest single sleep while waiting, in seconds
        #[arg(long, default_value_t = 30)]
        max_sleep_secs: u64,
    },

    /// Cancel the active job and any pending continuation
    Reset,

    /// Show the active job
    Status,

    /// Show the region bias
    Region,

    /// Set the region bias (two-letter code such as `us` or `gb`)
    SetRegion { code: String },

    /// Convert every row in one pass without checkpoints or retries
    GeocodeAll(Selection),

    /// Reverse-convert every row in one pass without checkpoints or retries
    ReverseGeocodeAll(Selection),
}

impl Commands {
    /// Whether the command calls the lookup service.
    pub fn needs_lookup(&self) -> bool {
        matches!(
            self,
            Commands::StartForward(_)
                | Commands::StartReverse(_)
                | Commands::Resume
                | Commands::RunDue
                | Commands::Worker { .. }
                | Commands::GeocodeAll(_)
                | Commands::ReverseGeocodeAll(_)
        )
    }
}
