//! # Station Records and Catalog
//!
//! A station has public metadata (name, ids, coordinates, provider) and a harmonics
//! record (constituent terms, datum and meridian offsets, units). Reference stations
//! are predicted from their own constituents; subordinate stations remap the events
//! of exactly one reference station by time offsets and magnitude multipliers.
//!
//! The [`StationCatalog`] stores each canonical station once and resolves every known
//! id, bin id and alias to it by index, so aliases can never drift from the canonical
//! data.

use crate::Units;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// One (constituent, amplitude, phase) row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarmonicTerm {
    pub constituent: String,
    /// Amplitude in the station's units, ≥ 0
    pub amplitude: f64,
    /// Phase lag in degrees, [0, 360)
    pub phase: f64,
}

/// Time and magnitude adjustments of a subordinate station.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubordinateOffsets {
    /// Lookup key of the reference station
    pub reference: String,
    pub high_offset_seconds: i64,
    pub high_multiplier: f64,
    pub low_offset_seconds: i64,
    pub low_multiplier: f64,
}

/// Offsets beyond one day are clamped; ingestion rejects them outright.
pub const MAX_OFFSET_SECONDS: i64 = 86_400;

fn clamped_offset(seconds: i64) -> Duration {
    Duration::seconds(seconds.clamp(-MAX_OFFSET_SECONDS, MAX_OFFSET_SECONDS))
}

impl SubordinateOffsets {
    pub fn high_offset(&self) -> Duration {
        clamped_offset(self.high_offset_seconds)
    }

    pub fn low_offset(&self) -> Duration {
        clamped_offset(self.low_offset_seconds)
    }

    /// Shift applied to slack water, the mean of the two offsets.
    pub fn slack_offset(&self) -> Duration {
        (self.high_offset() + self.low_offset()) / 2
    }

    /// Largest absolute time shift applied to any event.
    pub fn max_shift(&self) -> Duration {
        let (high, low) = (self.high_offset(), self.low_offset());
        high.max(-high).max(low.max(-low))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StationKind {
    Reference,
    Subordinate(SubordinateOffsets),
}

/// Everything needed to predict a station.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationHarmonics {
    pub terms: Vec<HarmonicTerm>,
    /// Mean-level correction added to the harmonic sum
    pub datum_offset: f64,
    /// Phase-reference meridian; local standard time = UTC − this offset
    pub meridian_minutes: i32,
    /// IANA timezone name, passed through for the serving layer
    pub timezone: String,
    pub units: Units,
    pub kind: StationKind,
}

impl StationHarmonics {
    pub fn subordinate(&self) -> Option<&SubordinateOffsets> {
        match &self.kind {
            StationKind::Subordinate(offsets) => Some(offsets),
            StationKind::Reference => None,
        }
    }

    pub fn is_subordinate(&self) -> bool {
        self.subordinate().is_some()
    }
}

/// Which dataset a record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Record-oriented harmonic constituent database
    HarmonicDatabase,
    /// Supplementary JSON global-model dataset
    GlobalModel,
}

/// Public identity of a station.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationMetadata {
    pub name: String,
    pub id: String,
    /// Bin/depth-qualified id of multi-depth current stations
    pub bin_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub region: Option<String>,
    pub provider: Provider,
    /// Observation depth of current stations, meters
    pub depth: Option<f64>,
}

impl StationMetadata {
    /// Key under which this station's harmonics are stored.
    pub fn lookup_key(&self) -> &str {
        self.bin_id.as_deref().unwrap_or(&self.id)
    }
}

/// Normalized record emitted by both source parsers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub metadata: StationMetadata,
    pub harmonics: StationHarmonics,
}

/// A canonical catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub metadata: StationMetadata,
    pub harmonics: StationHarmonics,
    /// Ids of duplicate records collapsed into this one
    pub aliases: Vec<String>,
}

impl Station {
    pub fn key(&self) -> &str {
        self.metadata.lookup_key()
    }
}

impl From<StationRecord> for Station {
    fn from(record: StationRecord) -> Self {
        Station {
            metadata: record.metadata,
            harmonics: record.harmonics,
            aliases: Vec::new(),
        }
    }
}

/// Canonical stations plus an index of every name they answer to.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StationCatalog {
    stations: Vec<Station>,
    index: HashMap<String, usize>,
}

impl StationCatalog {
    /// Build the catalog, dropping subordinates whose reference is missing or is itself
    /// subordinate.
    pub fn new(stations: Vec<Station>) -> Self {
        let provisional = Self::index_of(&stations);
        let valid: Vec<Station> = stations
            .iter()
            .filter(|station| match station.harmonics.subordinate() {
                None => true,
                Some(offsets) => {
                    match provisional.get(&offsets.reference).map(|&i| &stations[i]) {
                        Some(reference) if !reference.harmonics.is_subordinate() => true,
                        Some(_) => {
                            warn!(
                                station = %station.key(),
                                reference = %offsets.reference,
                                "reference station is itself subordinate, dropping"
                            );
                            false
                        }
                        None => {
                            warn!(
                                station = %station.key(),
                                reference = %offsets.reference,
                                "unresolvable reference station, dropping"
                            );
                            false
                        }
                    }
                }
            })
            .cloned()
            .collect();

        let mut stations = valid;
        stations.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id).then_with(|| a.key().cmp(b.key())));
        let index = Self::index_of(&stations);
        StationCatalog { stations, index }
    }

    fn index_of(stations: &[Station]) -> HashMap<String, usize> {
        let mut index = HashMap::new();
        // Lookup keys first so they win over a plain id shared by several bins
        for (i, station) in stations.iter().enumerate() {
            index.entry(station.key().to_string()).or_insert(i);
        }
        for (i, station) in stations.iter().enumerate() {
            index.entry(station.metadata.id.clone()).or_insert(i);
            for alias in &station.aliases {
                index.entry(alias.clone()).or_insert(i);
            }
        }
        index
    }

    /// Resolve any known id, bin id or alias.
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.index.get(id).map(|&i| &self.stations[i])
    }

    /// The reference station of a subordinate.
    pub fn reference_of(&self, station: &Station) -> Option<&Station> {
        let offsets = station.harmonics.subordinate()?;
        self.get(&offsets.reference)
            .filter(|reference| !reference.harmonics.is_subordinate())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Number of names the catalog resolves.
    pub fn alias_count(&self) -> usize {
        self.index.len()
    }
}
