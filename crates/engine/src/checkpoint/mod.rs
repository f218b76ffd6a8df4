//! Durable job state.
//!
//! One well-known slot holds the whole `JobState`; the store is a plain string
//! key-value map so the engine can sit on a JSON file, SQLite, or memory.

mod store;
mod types;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use store::{
    CheckpointStore, FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore, StoreError,
};
pub use types::{DatasetRef, JobMode, JobState};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKeyValueStore;
