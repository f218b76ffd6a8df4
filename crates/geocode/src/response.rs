use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Status code reported by the lookup service.
///
/// Only the two codes the engine reacts to are named; everything else is kept
/// verbatim so it can be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStatus {
    Ok,
    OverQueryLimit,
    Other(String),
}

impl LookupStatus {
    pub fn as_str(&self) -> &str {
        match self {
            LookupStatus::Ok => "OK",
            LookupStatus::OverQueryLimit => "OVER_QUERY_LIMIT",
            LookupStatus::Other(code) => code,
        }
    }
}

impl FromStr for LookupStatus {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "OK" => LookupStatus::Ok,
            "OVER_QUERY_LIMIT" => LookupStatus::OverQueryLimit,
            "" => LookupStatus::Other("UNKNOWN_ERROR".to_string()),
            other => LookupStatus::Other(other.to_string()),
        })
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first usable result of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupMatch {
    /// Forward lookup: address → coordinates.
    Position(Position),
    /// Reverse lookup: coordinates → formatted address.
    Address(String),
}

/// Tagged outcome of one lookup call that reached the service.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResponse {
    Found(LookupMatch),
    /// The service asked the caller to slow down.
    RateLimited,
    /// A definitive non-OK answer (`ZERO_RESULTS`, `REQUEST_DENIED`, ...).
    Rejected { status: LookupStatus },
}

impl LookupResponse {
    pub fn rejected(status: impl Into<String>) -> Self {
        let status = status.into();
        LookupResponse::Rejected {
            status: status.parse().unwrap_or(LookupStatus::Other(status)),
        }
    }

    pub fn status(&self) -> LookupStatus {
        match self {
            LookupResponse::Found(_) => LookupStatus::Ok,
            LookupResponse::RateLimited => LookupStatus::OverQueryLimit,
            LookupResponse::Rejected { status } => status.clone(),
        }
    }
}

/// A lookup call that never produced a service answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("lookup timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}
