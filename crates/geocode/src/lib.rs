//! `geobatch-geocode`
//!
//! **Responsibility:** the lookup capability boundary.
//!
//! - `Geocoder` is the only way the engine talks to a lookup service.
//! - Raw service payloads (nested, optional fields, string status codes) are
//!   converted here into one tagged `LookupResponse`; nothing past this crate
//!   sees JSON.
//! - Transport faults are `LookupError`s, never responses.

pub mod geocoder;
#[cfg(feature = "google")]
pub mod google;
pub mod memory;
pub mod payload;
pub mod response;

pub use geocoder::Geocoder;
#[cfg(feature = "google")]
pub use google::{GoogleGeocoder, GoogleGeocoderConfig};
pub use memory::{InMemoryGeocoder, LookupRequest};
pub use response::{LookupError, LookupMatch, LookupResponse, LookupStatus, Position};
