use geobatch_core::RegionCode;

use crate::response::{LookupError, LookupResponse, Position};

/// A lookup service that converts between addresses and coordinates.
///
/// Implementations make exactly one service call per method invocation; retry
/// and pacing belong to the caller. Any failure to obtain a service answer is an
/// `Err`, while every answer the service gives (including rate limiting) is an
/// `Ok(LookupResponse)`.
pub trait Geocoder: Send + Sync {
    /// Address → coordinates, biased toward `region`.
    fn geocode(&self, query: &str, region: &RegionCode) -> Result<LookupResponse, LookupError>;

    /// Coordinates → formatted address, biased toward `region`.
    fn reverse_geocode(
        &self,
        position: Position,
        region: &RegionCode,
    ) -> Result<LookupResponse, LookupError>;
}

impl<G> Geocoder for std::sync::Arc<G>
where
    G: Geocoder + ?Sized,
{
    fn geocode(&self, query: &str, region: &RegionCode) -> Result<LookupResponse, LookupError> {
        (**self).geocode(query, region)
    }

    fn reverse_geocode(
        &self,
        position: Position,
        region: &RegionCode,
    ) -> Result<LookupResponse, LookupError> {
        (**self).reverse_geocode(position, region)
    }
}
