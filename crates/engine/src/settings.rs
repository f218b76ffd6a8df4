//! User settings kept next to the job state.

use std::sync::Arc;

use tracing::{info, warn};

use geobatch_core::RegionCode;

use crate::checkpoint::{KeyValueStore, StoreError};

pub const REGION_KEY: &str = "geobatch.region";

/// The persisted region bias applied to every lookup.
#[derive(Clone)]
pub struct RegionSettings {
    kv: Arc<dyn KeyValueStore>,
    fallback: RegionCode,
}

impl RegionSettings {
    pub fn new(kv: Arc<dyn KeyValueStore>, fallback: RegionCode) -> Self {
        Self { kv, fallback }
    }

    /// Stored region, or the configured fallback when unset or unreadable.
    pub fn get(&self) -> Result<RegionCode, StoreError> {
        let Some(raw) = self.kv.get(REGION_KEY)? else {
            return Ok(self.fallback.clone());
        };
        match raw.parse() {
            Ok(code) => Ok(code),
            Err(err) => {
                warn!(stored = %raw, error = %err, "ignoring stored region");
                Ok(self.fallback.clone())
            }
        }
    }

    pub fn set(&self, code: &RegionCode) -> Result<(), StoreError> {
        self.kv.put(REGION_KEY, code.as_str())?;
        info!(region = %code, "region updated");
        Ok(())
    }
}
