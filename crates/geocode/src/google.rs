//! Google Maps Geocoding API adapter (blocking HTTP).

use std::time::Duration;

use geobatch_core::RegionCode;
use serde_json::Value;
use tracing::debug;

use crate::geocoder::Geocoder;
use crate::payload::{geocode_response, reverse_geocode_response};
use crate::response::{LookupError, LookupResponse, Position};

const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Connection settings for `GoogleGeocoder`.
#[derive(Debug, Clone)]
pub struct GoogleGeocoderConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl GoogleGeocoderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Read `GEOBATCH_GOOGLE_API_KEY` (required) and `GEOBATCH_GOOGLE_ENDPOINT`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEOBATCH_GOOGLE_API_KEY").ok()?;
        let mut config = Self::new(api_key);
        if let Ok(endpoint) = std::env::var("GEOBATCH_GOOGLE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        Some(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Geocoder backed by the Google Maps Geocoding web service.
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    client: reqwest::blocking::Client,
    config: GoogleGeocoderConfig,
}

impl GoogleGeocoder {
    pub fn new(config: GoogleGeocoderConfig) -> Result<Self, LookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LookupError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn fetch(&self, params: &[(&str, String)]) -> Result<Value, LookupError> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(params)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Transport(format!("HTTP {status}")));
        }

        response
            .json::<Value>()
            .map_err(|e| LookupError::MalformedResponse(e.to_string()))
    }
}

impl Geocoder for GoogleGeocoder {
    fn geocode(&self, query: &str, region: &RegionCode) -> Result<LookupResponse, LookupError> {
        debug!(query, region = %region, "geocode request");
        let payload = self.fetch(&[
            ("address", query.to_string()),
            ("region", region.to_string()),
        ])?;
        geocode_response(&payload)
    }

    fn reverse_geocode(
        &self,
        position: Position,
        region: &RegionCode,
    ) -> Result<LookupResponse, LookupError> {
        debug!(%position, region = %region, "reverse geocode request");
        let payload = self.fetch(&[
            ("latlng", position.to_string()),
            ("region", region.to_string()),
        ])?;
        reverse_geocode_response(&payload)
    }
}

fn classify(err: reqwest::Error) -> LookupError {
    if err.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Transport(err.to_string())
    }
}
