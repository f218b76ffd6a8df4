//! Wiring the engine to files, the lookup service and the environment.

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::debug;

use geobatch_core::{CellRange, RegionCode};
use geobatch_engine::{
    DatasetRef, EngineConfig, FileKeyValueStore, JobController, KeyValueStore, PersistentScheduler,
};
use geobatch_geocode::{
    Geocoder, GoogleGeocoder, GoogleGeocoderConfig, LookupError, LookupResponse, Position,
};
use geobatch_grid::CsvGrid;

use crate::{Cli, Selection, StoreKind};

/// Engine components for one invocation.
pub struct App {
    pub controller: JobController,
    pub scheduler: Arc<PersistentScheduler>,
}

impl App {
    pub fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = EngineConfig::from_env().context("invalid GEOBATCH_* configuration")?;
        let geocoder: Arc<dyn Geocoder> = if cli.command.needs_lookup() {
            Arc::new(google_geocoder(&config)?)
        } else {
            Arc::new(NoLookups)
        };
        Self::with_geocoder(cli, config, geocoder)
    }

    /// Build with an explicit geocoder (tests, alternative services).
    pub fn with_geocoder(
        cli: &Cli,
        config: EngineConfig,
        geocoder: Arc<dyn Geocoder>,
    ) -> anyhow::Result<Self> {
        let store = open_store(cli)?;
        let scheduler = Arc::new(PersistentScheduler::new(store.clone()));
        let grid = Arc::new(CsvGrid::new(&cli.data_dir));

        debug!(
            state_dir = %cli.state_dir.display(),
            data_dir = %cli.data_dir.display(),
            store = ?cli.store,
            "engine wired"
        );

        let controller = JobController::new(config, store, scheduler.clone(), grid, geocoder);
        Ok(Self {
            controller,
            scheduler,
        })
    }
}

pub fn selection(selection: &Selection) -> anyhow::Result<DatasetRef> {
    let range: CellRange = selection
        .range
        .parse()
        .with_context(|| format!("invalid range '{}'", selection.range))?;
    Ok(DatasetRef::new(selection.sheet.clone(), range))
}

fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match cli.store {
        StoreKind::Json => Ok(Arc::new(FileKeyValueStore::new(
            cli.state_dir.join("state.json"),
        ))),
        StoreKind::Sqlite => open_sqlite(cli),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(cli: &Cli) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let path = cli.state_dir.join("state.db");
    let store = geobatch_engine::SqliteKeyValueStore::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_cli: &Cli) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    bail!("this build has no SQLite support; rebuild with `--features sqlite`")
}

fn google_geocoder(config: &EngineConfig) -> anyhow::Result<GoogleGeocoder> {
    let Some(google) = GoogleGeocoderConfig::from_env() else {
        bail!("GEOBATCH_GOOGLE_API_KEY is not set");
    };
    GoogleGeocoder::new(google.with_timeout(config.lookup_timeout))
        .context("failed to build the lookup client")
}

/// Stand-in for commands that never look anything up.
struct NoLookups;

impl Geocoder for NoLookups {
    fn geocode(&self, _query: &str, _region: &RegionCode) -> Result<LookupResponse, LookupError> {
        Err(LookupError::Internal("no lookup service configured".to_string()))
    }

    fn reverse_geocode(
        &self,
        _position: Position,
        _region: &RegionCode,
    ) -> Result<LookupResponse, LookupError> {
        Err(LookupError::Internal("no lookup service configured".to_string()))
    }
}
