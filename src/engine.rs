//! # Prediction Engine
//!
//! [`TideEngine`] is the long-lived context object shared by every request thread. It
//! owns the lazily built station catalog, the nodal-factor table, the reference-peak
//! cache and the optional on-disk cache. Nothing is global: tests and embedders build
//! as many isolated engines as they like, and [`EngineCell`] provides the shared
//! get-or-initialize slot for a serving process.
//!
//! ## Catalog Lifecycle
//!
//! The first operation that needs stations reads both source files, fingerprints their
//! bytes and either loads the persisted catalog for that fingerprint or ingests,
//! deduplicates and persists a fresh one. Concurrent first callers are serialized:
//! a read-locked check, then a write-locked re-check, so the catalog is built once.
//!
//! ## Degraded Results
//!
//! Unknown stations and stations without usable constituents produce empty results and
//! a `warn` log, so batch lookups across many ids keep going. Invalid windows and step
//! sizes are caller errors and are returned as such.

use crate::cache::{self, CatalogSnapshot, DiskCache, SCHEMA_VERSION};
use crate::config::EngineConfig;
use crate::constituents::ConstituentCatalog;
use crate::dedup::deduplicate;
use crate::error::TideError;
use crate::ingest::{parse_primary, parse_secondary};
use crate::nodal::{NodalFactorSet, NodalFactors, NodalKey, NodalTable};
use crate::optimizer::{find_events_brute_force, find_events_optimized, month_windows, ReferencePeakCache, SearchSettings};
use crate::peaks::zero_crossings;
use crate::station::{Station, StationCatalog, StationMetadata, SubordinateOffsets};
use crate::synth::{remap_events, time_grid, ReferenceSeries, SeriesSource};
use crate::{Event, EventKind, PredictionPoint};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ingested, deduplicated data for one pair of source files.
#[derive(Debug)]
struct LoadedData {
    constituents: ConstituentCatalog,
    stations: StationCatalog,
    fingerprint: String,
}

/// Harmonic prediction context.
#[derive(Debug)]
pub struct TideEngine {
    config: EngineConfig,
    disk: Option<DiskCache>,
    data: RwLock<Option<Arc<LoadedData>>>,
    nodal: NodalTable,
    reference_peaks: ReferencePeakCache,
}

impl TideEngine {
    /// Create an engine, failing with [`TideError::MissingSourceData`] when either
    /// source file does not exist. Sources are read on first use.
    pub fn new(config: EngineConfig) -> Result<Self, TideError> {
        let missing: Vec<PathBuf> = [&config.sources.primary, &config.sources.secondary]
            .into_iter()
            .filter(|path| !path.is_file())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TideError::MissingSourceData { missing });
        }

        let disk = config.cache_dir().map(DiskCache::new);
        if let Some(disk) = &disk {
            debug!(dir = %disk.root().display(), "on-disk cache enabled");
        }
        Ok(TideEngine {
            config,
            disk,
            data: RwLock::new(None),
            nodal: NodalTable::new(),
            reference_peaks: ReferencePeakCache::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn data(&self) -> Result<Arc<LoadedData>, TideError> {
        if let Some(data) = self.data.read().as_ref() {
            return Ok(Arc::clone(data));
        }
        let mut slot = self.data.write();
        if let Some(data) = slot.as_ref() {
            return Ok(Arc::clone(data));
        }
        let data = Arc::new(self.build()?);
        *slot = Some(Arc::clone(&data));
        Ok(data)
    }

    fn build(&self) -> Result<LoadedData, TideError> {
        let sources = &self.config.sources;
        let primary = read_source(&sources.primary, &sources.secondary)?;
        let secondary = read_source(&sources.secondary, &sources.primary)?;
        let fingerprint = cache::fingerprint(&primary, &secondary);

        if let Some(snapshot) = self.disk.as_ref().and_then(|disk| disk.load_catalog(&fingerprint)) {
            info!(stations = snapshot.stations.len(), "station catalog loaded from cache");
            return Ok(LoadedData {
                constituents: snapshot.constituents,
                stations: snapshot.stations,
                fingerprint,
            });
        }

        let mut constituents = ConstituentCatalog::builtin();
        let mut records = parse_primary(
            &String::from_utf8_lossy(&primary),
            &sources.primary.display().to_string(),
            &mut constituents,
        );
        records.extend(parse_secondary(
            &String::from_utf8_lossy(&secondary),
            &sources.secondary.display().to_string(),
            &constituents,
        )?);

        let outcome = deduplicate(records, &self.config.dedup);
        let stations = StationCatalog::new(outcome.stations);
        info!(
            stations = stations.len(),
            names = stations.alias_count(),
            collapsed = outcome.collapsed,
            ambiguous = outcome.ambiguous,
            constituents = constituents.len(),
            "built station catalog"
        );

        let snapshot = CatalogSnapshot {
            schema_version: SCHEMA_VERSION,
            fingerprint,
            constituents,
            stations,
        };
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.store_catalog(&snapshot) {
                warn!(error = %e, "failed to persist station catalog");
            }
        }
        Ok(LoadedData {
            constituents: snapshot.constituents,
            stations: snapshot.stations,
            fingerprint: snapshot.fingerprint,
        })
    }

    fn nodal<'a>(&'a self, data: &'a LoadedData) -> NodalFactors<'a> {
        let factors = NodalFactors::new(&data.constituents, &self.nodal);
        match &self.disk {
            Some(disk) => factors.with_disk(disk, &data.fingerprint),
            None => factors,
        }
    }

    /// Metadata of every canonical station, sorted by id.
    pub fn stations(&self) -> Result<Vec<StationMetadata>, TideError> {
        Ok(self.data()?.stations.iter().map(|s| s.metadata.clone()).collect())
    }

    /// Resolve a station by id, bin id or alias.
    pub fn station(&self, id: &str) -> Result<Option<Station>, TideError> {
        Ok(self.data()?.stations.get(id).cloned())
    }

    /// Like [`TideEngine::station`], but an unknown id is an error.
    pub fn resolve(&self, id: &str) -> Result<Station, TideError> {
        self.station(id)?.ok_or_else(|| TideError::UnknownStation(id.to_string()))
    }

    /// Nodal factors for `key`, from memory, disk or computation.
    pub fn nodal_factors(&self, key: &NodalKey) -> Result<Arc<NodalFactorSet>, TideError> {
        let data = self.data()?;
        Ok(self.nodal(&data).get(key))
    }

    /// Values from `start` through `end` every `step`.
    ///
    /// Subordinate stations have no harmonic series of their own; they return their
    /// remapped extrema (and slack, for currents) inside the window as points.
    pub fn predict_series(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<PredictionPoint>, TideError> {
        time_grid(start, end, step)?;
        let data = self.data()?;
        let Some(station) = known_station(&data, id) else {
            return Ok(Vec::new());
        };

        match station.harmonics.subordinate() {
            None => match ReferenceSeries::new(station.key(), &station.harmonics, self.nodal(&data)) {
                Ok(series) => series.series(start, end, step),
                Err(e) => degrade(e),
            },
            Some(offsets) => {
                let buffer = self.config.prediction.subordinate_buffer();
                let optimized = self.config.prediction.use_optimizer;
                let events = self.subordinate_events(&data, station, offsets, start, end, buffer, optimized)?;
                Ok(events
                    .iter()
                    .filter(|e| e.time >= start && e.time <= end)
                    .map(Event::as_point)
                    .collect())
            }
        }
    }

    /// Refined events in `[start, end)`, time ordered.
    pub fn predict_events(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        optimized: bool,
    ) -> Result<Vec<Event>, TideError> {
        if end < start {
            return Err(TideError::InvalidWindow { start, end });
        }
        let data = self.data()?;
        let Some(station) = known_station(&data, id) else {
            return Ok(Vec::new());
        };

        match station.harmonics.subordinate() {
            None => {
                let series = match ReferenceSeries::new(station.key(), &station.harmonics, self.nodal(&data)) {
                    Ok(series) => series,
                    Err(e) => return degrade(e),
                };
                let settings = SearchSettings::from_config(&self.config.prediction);
                if optimized {
                    find_events_optimized(&series, start, end, &settings)
                } else {
                    find_events_brute_force(&series, start, end, &settings)
                }
            }
            Some(offsets) => {
                let buffer = self.config.prediction.subordinate_buffer();
                let events = self.subordinate_events(&data, station, offsets, start, end, buffer, optimized)?;
                Ok(events.into_iter().filter(|e| e.time >= start && e.time < end).collect())
            }
        }
    }

    /// Use the configured default search.
    pub fn predict_events_default(&self, id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Event>, TideError> {
        self.predict_events(id, start, end, self.config.prediction.use_optimizer)
    }

    /// Remapped events of a subordinate around `[start, end]`, unfiltered.
    #[allow(clippy::too_many_arguments)]
    fn subordinate_events(
        &self,
        data: &LoadedData,
        station: &Station,
        offsets: &SubordinateOffsets,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buffer: Duration,
        optimized: bool,
    ) -> Result<Vec<Event>, TideError> {
        let Some(reference) = data.stations.reference_of(station) else {
            warn!(station = %station.key(), reference = %offsets.reference, "reference station unavailable");
            return Ok(Vec::new());
        };
        let series = match ReferenceSeries::new(reference.key(), &reference.harmonics, self.nodal(data)) {
            Ok(series) => series,
            Err(e) => return degrade(e),
        };

        // Events shift by up to max_shift, so look that far beyond the window
        let buffer = buffer.max(offsets.max_shift() + Duration::hours(1));
        let (from, to) = (start - buffer, end + buffer);
        let settings = SearchSettings::from_config(&self.config.prediction);

        let reference_events = if optimized {
            let mut events = Vec::new();
            for (month, month_end) in month_windows(from, to) {
                let month_events = self.reference_peaks.get_or_compute(reference.key(), month, || {
                    find_events_optimized(&series, month, month_end, &settings)
                })?;
                events.extend(month_events.iter().filter(|e| e.time >= from && e.time <= to).copied());
            }
            self.reference_peaks.prune_outside(from, to);
            events
        } else {
            find_events_brute_force(&series, from, to, &settings)?
        };

        let extrema: Vec<Event> = reference_events
            .into_iter()
            .filter(|e| e.kind != EventKind::Slack)
            .collect();
        // Reference values are in the reference's units, which dedup may have changed
        let (units, scale) = match reference.harmonics.units.factor_to(station.harmonics.units) {
            Some(scale) => (station.harmonics.units, scale),
            None => {
                warn!(
                    station = %station.key(),
                    reference = %reference.key(),
                    "subordinate and reference measure different quantities, keeping reference units"
                );
                (reference.harmonics.units, 1.0)
            }
        };
        let mut events: Vec<Event> = remap_events(&extrema, offsets)
            .into_iter()
            .map(|e| Event {
                value: e.value * scale,
                units,
                ..e
            })
            .collect();
        if units.is_current() {
            let points: Vec<PredictionPoint> = events.iter().map(Event::as_point).collect();
            events.extend(zero_crossings(&points));
            events.sort_by_key(|e| e.time);
        }
        Ok(events)
    }
}

fn read_source(path: &Path, other: &Path) -> Result<Vec<u8>, TideError> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TideError::MissingSourceData {
            missing: [path, other].into_iter().filter(|p| !p.is_file()).map(PathBuf::from).collect(),
        },
        _ => TideError::Io(e),
    })
}

fn known_station<'a>(data: &'a LoadedData, id: &str) -> Option<&'a Station> {
    let station = data.stations.get(id);
    if station.is_none() {
        warn!(station = id, "{}", TideError::UnknownStation(id.to_string()));
    }
    station
}

/// Downgrade a per-station failure to an empty result.
fn degrade<T>(error: TideError) -> Result<Vec<T>, TideError> {
    match error {
        TideError::EmptyConstituents(_) | TideError::UnknownStation(_) => {
            warn!("{error}, no prediction");
            Ok(Vec::new())
        }
        other => Err(other),
    }
}

/// Thread-safe get-or-initialize slot for a shared engine.
#[derive(Debug, Default)]
pub struct EngineCell {
    slot: RwLock<Option<Arc<TideEngine>>>,
}

impl EngineCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine, if already initialized.
    pub fn get(&self) -> Option<Arc<TideEngine>> {
        self.slot.read().clone()
    }

    /// Return the engine, running `init` exactly once across concurrent first callers.
    /// A failed `init` leaves the cell empty for the next caller to retry.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<TideEngine>, TideError>
    where
        F: FnOnce() -> Result<TideEngine, TideError>,
    {
        if let Some(engine) = self.slot.read().as_ref() {
            return Ok(Arc::clone(engine));
        }
        let mut slot = self.slot.write();
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }
        let engine = Arc::new(init()?);
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }
}
