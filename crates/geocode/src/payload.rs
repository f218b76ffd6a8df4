//! Conversion of raw lookup payloads into `LookupResponse`.
//!
//! Two payload shapes are accepted for the first result:
//! - the HTTP API shape: `results[0].geometry.location`, `results[0].formatted_address`
//! - the flattened scripting shape: `results[0].location`, `results[0].formattedAddress`
//!
//! An `OK` status without a usable first result is reported as `ZERO_RESULTS`.

use serde_json::Value;

use crate::response::{LookupError, LookupMatch, LookupResponse, LookupStatus, Position};

/// Interpret a forward (address → coordinates) payload.
pub fn geocode_response(payload: &Value) -> Result<LookupResponse, LookupError> {
    interpret(payload, |first| first_position(first).map(LookupMatch::Position))
}

/// Interpret a reverse (coordinates → address) payload.
pub fn reverse_geocode_response(payload: &Value) -> Result<LookupResponse, LookupError> {
    interpret(payload, |first| first_address(first).map(LookupMatch::Address))
}

fn interpret(
    payload: &Value,
    extract: impl Fn(&Value) -> Option<LookupMatch>,
) -> Result<LookupResponse, LookupError> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| LookupError::MalformedResponse("missing 'status'".to_string()))?;

    let status: LookupStatus = match status.parse() {
        Ok(s) => s,
        Err(never) => match never {},
    };

    match status {
        LookupStatus::Ok => {
            let found = payload
                .get("results")
                .and_then(Value::as_array)
                .and_then(|results| results.first())
                .and_then(extract);

            Ok(match found {
                Some(m) => LookupResponse::Found(m),
                None => LookupResponse::rejected("ZERO_RESULTS"),
            })
        }
        LookupStatus::OverQueryLimit => Ok(LookupResponse::RateLimited),
        other => Ok(LookupResponse::Rejected { status: other }),
    }
}

fn first_position(first: &Value) -> Option<Position> {
    let location = first
        .get("geometry")
        .and_then(|g| g.get("location"))
        .or_else(|| first.get("location"))?;

    let lat = location.get("lat").and_then(Value::as_f64)?;
    let lng = location.get("lng").and_then(Value::as_f64)?;

    if !(lat.is_finite() && lng.is_finite()) {
        return None;
    }

    Some(Position::new(lat, lng))
}

fn first_address(first: &Value) -> Option<String> {
    first
        .get("formatted_address")
        .or_else(|| first.get("formattedAddress"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
