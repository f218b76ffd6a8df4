//! One row in, output cells out.
//!
//! Region columns have fixed roles: column 1 is the address, columns 2 and 3
//! are latitude and longitude. The direction decides which side is input.

use std::sync::Arc;

use tracing::{debug, warn};

use geobatch_core::RegionCode;
use geobatch_geocode::{Geocoder, LookupError, LookupMatch, LookupResponse, Position};
use geobatch_grid::{Grid, GridError};

use crate::checkpoint::DatasetRef;
use crate::pacing::Pacer;
use crate::retry::{AttemptBudget, AttemptClass, RetryDecision, RetryPolicy};

/// Which way a job converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Address (column 1) → latitude, longitude (columns 2, 3).
    Forward,
    /// Latitude, longitude (columns 2, 3) → address (column 1).
    Reverse,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Forward => "Geocoding",
            Direction::Reverse => "Reverse geocoding",
        }
    }

    /// Region column that receives error markers.
    fn marker_column(self) -> u32 {
        match self {
            Direction::Forward => 2,
            Direction::Reverse => 1,
        }
    }
}

/// Terminal result for one row. Only this is ever written to the dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Success(LookupMatch),
    /// The service gave a definitive non-OK answer (or kept rate limiting).
    ServiceError(String),
    /// No service answer after all fault retries.
    TransientFailure(String),
    /// Nothing to look up; no call made, nothing written.
    SkippedEmpty,
}

impl RecordOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            RecordOutcome::ServiceError(_) | RecordOutcome::TransientFailure(_)
        )
    }

    /// Marker text written in place of a value.
    pub fn marker(&self) -> Option<String> {
        match self {
            RecordOutcome::ServiceError(code) => Some(format!("Error: service rejected ({code})")),
            RecordOutcome::TransientFailure(reason) => {
                Some(format!("Error: unexpected fault ({reason})"))
            }
            RecordOutcome::Success(_) | RecordOutcome::SkippedEmpty => None,
        }
    }
}

enum Input {
    Query(String),
    Coordinates(Position),
    Invalid,
    Empty,
}

/// Processes a single row with retry, rate-limit cooldowns and error markers.
pub struct RecordProcessor {
    grid: Arc<dyn Grid>,
    geocoder: Arc<dyn Geocoder>,
    pacer: Arc<dyn Pacer>,
    policy: RetryPolicy,
}

impl RecordProcessor {
    pub fn new(
        grid: Arc<dyn Grid>,
        geocoder: Arc<dyn Geocoder>,
        pacer: Arc<dyn Pacer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            grid,
            geocoder,
            pacer,
            policy,
        }
    }

    /// Process region row `row` (1-based) of `dataset`.
    ///
    /// Lookup problems never surface as `Err`; they become outcomes and
    /// markers. `Err` means the dataset itself could not be read or written.
    pub fn process(
        &self,
        row: u32,
        dataset: &DatasetRef,
        direction: Direction,
        region: &RegionCode,
    ) -> Result<RecordOutcome, GridError> {
        let sheet_row = dataset.range.sheet_row(row);
        let input = self.read_input(dataset, sheet_row, direction)?;

        let outcome = match input {
            Input::Empty => {
                debug!(row, "skipping empty row");
                return Ok(RecordOutcome::SkippedEmpty);
            }
            Input::Invalid => RecordOutcome::ServiceError("INVALID_REQUEST".to_string()),
            Input::Query(query) => self.lookup(row, |g| g.geocode(&query, region)),
            Input::Coordinates(position) => {
                self.lookup(row, |g| g.reverse_geocode(position, region))
            }
        };

        let outcome = match (direction, outcome) {
            (Direction::Forward, RecordOutcome::Success(LookupMatch::Address(_)))
            | (Direction::Reverse, RecordOutcome::Success(LookupMatch::Position(_))) => {
                RecordOutcome::ServiceError("UNEXPECTED_RESULT".to_string())
            }
            (_, other) => other,
        };

        self.write_outcome(dataset, sheet_row, direction, &outcome)?;
        Ok(outcome)
    }

    fn read_input(
        &self,
        dataset: &DatasetRef,
        sheet_row: u32,
        direction: Direction,
    ) -> Result<Input, GridError> {
        let cell = |offset: u32| {
            self.grid
                .read(&dataset.sheet, sheet_row, dataset.range.sheet_column(offset))
                .map(|v| v.trim().to_string())
        };

        match direction {
            Direction::Forward => {
                let address = cell(1)?;
                Ok(if address.is_empty() {
                    Input::Empty
                } else {
                    Input::Query(address)
                })
            }
            Direction::Reverse => {
                let (lat, lng) = (cell(2)?, cell(3)?);
                if lat.is_empty() || lng.is_empty() {
                    return Ok(Input::Empty);
                }
                Ok(parse_position(&lat, &lng).map_or(Input::Invalid, Input::Coordinates))
            }
        }
    }

    fn lookup(
        &self,
        row: u32,
        call: impl Fn(&dyn Geocoder) -> Result<LookupResponse, LookupError>,
    ) -> RecordOutcome {
        let mut budget = AttemptBudget::default();
        loop {
            let attempt = call(self.geocoder.as_ref());
            let class = classify(&attempt);

            match self.policy.decide(&mut budget, class) {
                RetryDecision::Done | RetryDecision::GiveUp => return terminal(attempt),
                RetryDecision::RetryNow => {
                    warn!(
                        row,
                        ?class,
                        faults = budget.faults,
                        cooldowns = budget.cooldowns,
                        "retrying lookup"
                    );
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        row,
                        ?class,
                        faults = budget.faults,
                        cooldowns = budget.cooldowns,
                        delay_ms = delay.as_millis() as u64,
                        "retrying lookup after pause"
                    );
                    self.pacer.pause(delay);
                }
            }
        }
    }

    fn write_outcome(
        &self,
        dataset: &DatasetRef,
        sheet_row: u32,
        direction: Direction,
        outcome: &RecordOutcome,
    ) -> Result<(), GridError> {
        let write = |offset: u32, value: &str| {
            self.grid.write(
                &dataset.sheet,
                sheet_row,
                dataset.range.sheet_column(offset),
                value,
            )
        };

        match outcome {
            RecordOutcome::SkippedEmpty => Ok(()),
            RecordOutcome::Success(LookupMatch::Position(p)) => {
                write(2, &p.lat.to_string())?;
                write(3, &p.lng.to_string())
            }
            RecordOutcome::Success(LookupMatch::Address(address)) => write(1, address),
            RecordOutcome::ServiceError(_) | RecordOutcome::TransientFailure(_) => {
                let marker = outcome.marker().unwrap_or_default();
                write(direction.marker_column(), &marker)
            }
        }
    }
}

fn classify(attempt: &Result<LookupResponse, LookupError>) -> AttemptClass {
    match attempt {
        Ok(LookupResponse::Found(_)) => AttemptClass::Success,
        Ok(LookupResponse::RateLimited) => AttemptClass::RateLimited,
        Ok(LookupResponse::Rejected { .. }) => AttemptClass::PermanentError,
        Err(_) => AttemptClass::TransientError,
    }
}

fn terminal(attempt: Result<LookupResponse, LookupError>) -> RecordOutcome {
    match attempt {
        Ok(LookupResponse::Found(m)) => RecordOutcome::Success(m),
        Ok(LookupResponse::RateLimited) => {
            RecordOutcome::ServiceError("OVER_QUERY_LIMIT".to_string())
        }
        Ok(LookupResponse::Rejected { status }) => RecordOutcome::ServiceError(status.to_string()),
        Err(e) => RecordOutcome::TransientFailure(e.to_string()),
    }
}

fn parse_position(lat: &str, lng: &str) -> Option<Position> {
    let lat: f64 = lat.parse().ok()?;
    let lng: f64 = lng.parse().ok()?;
    let valid = lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng);
    valid.then(|| Position::new(lat, lng))
}
