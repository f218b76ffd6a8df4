//! Subcommand handlers. Each prints a short human summary to stdout.

use std::time::Duration;

use chrono::Utc;
use tracing::info;

use geobatch_engine::{
    JobMode, JobState, ResumeOutcome, SliceNext, SliceReport, UnboundedReport,
    status::format_elapsed,
};

use crate::app::{self, App};
use crate::{Cli, Commands};

pub fn run(cli: &Cli, app: &App) -> anyhow::Result<()> {
    match &cli.command {
        Commands::StartForward(selection) => {
            let dataset = app::selection(selection)?;
            let report = app.controller.start(JobMode::AddressToPosition, dataset)?;
            println!("{}", describe_slice(&report));
        }
        Commands::StartReverse(selection) => {
            let dataset = app::selection(selection)?;
            let report = app.controller.start(JobMode::PositionToAddress, dataset)?;
            println!("{}", describe_slice(&report));
        }
        Commands::Resume => println!("{}", describe_resume(&app.controller.resume()?)),
        Commands::RunDue => match app.scheduler.take_due(Utc::now())? {
            Some(_) => println!("{}", describe_resume(&app.controller.resume()?)),
            None => println!("nothing due"),
        },
        Commands::Worker { max_sleep_secs } => {
            worker(app, Duration::from_secs((*max_sleep_secs).max(1)))?
        }
        Commands::Reset => {
            app.controller.reset()?;
            println!("job reset");
        }
        Commands::Status => println!("{}", describe_state(&app.controller.status()?)),
        Commands::Region => println!("{}", app.controller.region()?),
        Commands::SetRegion { code } => {
            let region = app.controller.set_region(code)?;
            println!("region set to {region}");
        }
        Commands::GeocodeAll(selection) => {
            let dataset = app::selection(selection)?;
            let report = app
                .controller
                .run_unbounded(JobMode::AddressToPosition, &dataset)?;
            println!("{}", describe_unbounded(&report));
        }
        Commands::ReverseGeocodeAll(selection) => {
            let dataset = app::selection(selection)?;
            let report = app
                .controller
                .run_unbounded(JobMode::PositionToAddress, &dataset)?;
            println!("{}", describe_unbounded(&report));
        }
    }
    Ok(())
}

/// Fire continuations as they come due until none is armed.
fn worker(app: &App, max_sleep: Duration) -> anyhow::Result<()> {
    info!("worker started");
    while let Some(armed) = app.scheduler.pending()? {
        let wait = (armed.due_at - Utc::now()).to_std().unwrap_or_default();
        if !wait.is_zero() {
            std::thread::sleep(wait.min(max_sleep));
            continue;
        }
        if app.scheduler.take_due(Utc::now())?.is_some() {
            // A failed slice re-arms itself; keep going.
            match app.controller.resume() {
                Ok(outcome) => println!("{}", describe_resume(&outcome)),
                Err(err) => eprintln!("slice failed: {err}"),
            }
        }
    }
    println!("no continuation armed, worker done");
    Ok(())
}

pub fn describe_slice(report: &SliceReport) -> String {
    let rows = match report.rows {
        Some((first, last)) => format!("rows {first}-{last}"),
        None => "no rows left".to_string(),
    };
    match report.next {
        SliceNext::Continue { next_row, after } => format!(
            "{rows} done ({} errors in slice); next slice from row {next_row} in {}",
            report.counts.errors(),
            format_elapsed(after)
        ),
        SliceNext::Completed(summary) => format!(
            "{rows} done; job complete: {} rows processed in {}, {} errors",
            summary.processed,
            format_elapsed(summary.elapsed),
            summary.errors
        ),
    }
}

pub fn describe_resume(outcome: &ResumeOutcome) -> String {
    match outcome {
        ResumeOutcome::Idle => "no active job".to_string(),
        ResumeOutcome::Abandoned { reason, .. } => format!("job abandoned: {reason}"),
        ResumeOutcome::Ran(report) => describe_slice(report),
    }
}

pub fn describe_state(state: &JobState) -> String {
    let Some(dataset) = state.dataset.as_ref().filter(|_| state.is_active()) else {
        return "idle".to_string();
    };
    let mode = match state.mode {
        JobMode::AddressToPosition => "geocoding",
        JobMode::PositionToAddress => "reverse geocoding",
        JobMode::Idle => "idle",
    };
    format!(
        "{mode} {dataset}: {}/{} rows processed, {} errors, next row {}",
        state.processed_count, state.total_rows, state.error_count, state.current_row
    )
}

fn describe_unbounded(report: &UnboundedReport) -> String {
    format!(
        "{} rows processed in {}, {} errors",
        report.processed,
        format_elapsed(report.elapsed),
        report.errors
    )
}
