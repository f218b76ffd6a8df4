//! `geobatch-core`: shared building blocks.
//!
//! This crate contains **pure** value types (no I/O): cell ranges, region codes,
//! job identifiers and the validation error they report.

pub mod error;
pub mod id;
pub mod range;
pub mod region;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use range::CellRange;
pub use region::RegionCode;
