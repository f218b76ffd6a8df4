//! `geobatch-grid`: the tabular dataset boundary.
//!
//! A dataset is a set of named sheets addressed by 1-based (row, column). The
//! engine never sees files or spreadsheets directly, only the `Grid` trait.

pub mod csv_file;
pub mod grid;
pub mod memory;

pub use csv_file::CsvGrid;
pub use grid::{Grid, GridError};
pub use memory::InMemoryGrid;
