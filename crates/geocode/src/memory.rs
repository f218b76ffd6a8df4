//! Scripted in-memory geocoder for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;

use geobatch_core::RegionCode;

use crate::geocoder::Geocoder;
use crate::response::{LookupError, LookupMatch, LookupResponse, Position};

type Scripted = Result<LookupResponse, LookupError>;

/// A request observed by `InMemoryGeocoder`.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupRequest {
    Geocode { query: String, region: RegionCode },
    Reverse { position: Position, region: RegionCode },
}

/// Geocoder answering from canned scripts.
///
/// Each key (the trimmed query, or `lat,lng` for reverse lookups) owns a script
/// of answers consumed one per call; the last answer repeats forever. Keys with
/// no script get the default answer (`ZERO_RESULTS` unless overridden).
#[derive(Debug)]
pub struct InMemoryGeocoder {
    scripts: Mutex<HashMap<String, Vec<Scripted>>>,
    default: Scripted,
    requests: Mutex<Vec<LookupRequest>>,
}

impl InMemoryGeocoder {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: Ok(LookupResponse::rejected("ZERO_RESULTS")),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer `query` with a position.
    pub fn with_position(self, query: impl AsRef<str>, lat: f64, lng: f64) -> Self {
        let found = LookupResponse::Found(LookupMatch::Position(Position::new(lat, lng)));
        self.with_script(query, vec![Ok(found)])
    }

    /// Answer a reverse lookup of `position` with an address.
    pub fn with_address(self, position: Position, address: impl Into<String>) -> Self {
        let found = LookupResponse::Found(LookupMatch::Address(address.into()));
        self.with_script(position.to_string(), vec![Ok(found)])
    }

    /// Answer `key` with `script`, one entry per call, repeating the last entry.
    pub fn with_script(self, key: impl AsRef<str>, script: Vec<Scripted>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(key.as_ref().trim().to_string(), script);
        }
        self
    }

    /// Answer unknown keys with `answer`.
    pub fn with_default(mut self, answer: Scripted) -> Self {
        self.default = answer;
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<LookupRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn answer(&self, key: &str, request: LookupRequest) -> Scripted {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| LookupError::Internal("geocoder script lock poisoned".to_string()))?;

        match scripts.get_mut(key) {
            Some(script) if script.len() > 1 => script.remove(0),
            Some(script) => script.first().cloned().unwrap_or_else(|| self.default.clone()),
            None => self.default.clone(),
        }
    }
}

impl Default for InMemoryGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder for InMemoryGeocoder {
    fn geocode(&self, query: &str, region: &RegionCode) -> Result<LookupResponse, LookupError> {
        let key = query.trim().to_string();
        self.answer(
            &key,
            LookupRequest::Geocode {
                query: key.clone(),
                region: region.clone(),
            },
        )
    }

    fn reverse_geocode(
        &self,
        position: Position,
        region: &RegionCode,
    ) -> Result<LookupResponse, LookupError> {
        self.answer(
            &position.to_string(),
            LookupRequest::Reverse {
                position,
                region: region.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_consumed_then_last_answer_repeats() {
        let geocoder = InMemoryGeocoder::new().with_script(
            "flaky",
            vec![
                Err(LookupError::Timeout),
                Ok(LookupResponse::RateLimited),
                Ok(LookupResponse::rejected("ZERO_RESULTS")),
            ],
        );
        let region = RegionCode::default();

        assert_eq!(geocoder.geocode("flaky", &region), Err(LookupError::Timeout));
        assert_eq!(geocoder.geocode("flaky", &region), Ok(LookupResponse::RateLimited));
        assert_eq!(
            geocoder.geocode(" flaky ", &region),
            Ok(LookupResponse::rejected("ZERO_RESULTS"))
        );
        assert_eq!(
            geocoder.geocode("flaky", &region),
            Ok(LookupResponse::rejected("ZERO_RESULTS"))
        );
        assert_eq!(geocoder.calls(), 4);
    }

    #[test]
    fn unknown_keys_get_the_default() {
        let geocoder =
            InMemoryGeocoder::new().with_default(Err(LookupError::Transport("down".into())));
        let region: RegionCode = "gb".parse().unwrap();

        assert!(geocoder.geocode("anywhere", &region).is_err());
        assert_eq!(
            geocoder.requests(),
            vec![LookupRequest::Geocode {
                query: "anywhere".to_string(),
                region
            }]
        );
    }

    #[test]
    fn reverse_lookups_are_keyed_by_position() {
        let position = Position::new(51.5007, -0.1246);
        let geocoder = InMemoryGeocoder::new().with_address(position, "Westminster, London");

        assert_eq!(
            geocoder.reverse_geocode(position, &RegionCode::default()),
            Ok(LookupResponse::Found(LookupMatch::Address(
                "Westminster, London".to_string()
            )))
        );
    }
}
