//! # Configuration Management
//!
//! This module loads engine settings from `tide-engine.toml`. It covers the two
//! required source files, the on-disk cache location, the coarse-to-fine search
//! parameters and the deduplication tolerances.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default configuration file name, resolved relative to the working directory.
pub const CONFIG_FILE: &str = "tide-engine.toml";

/// Engine configuration loaded from tide-engine.toml
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Harmonic source files
    pub sources: SourceConfig,
    /// On-disk persistence
    pub cache: CacheConfig,
    /// Event search parameters
    pub prediction: PredictionConfig,
    /// Duplicate-station tolerances
    pub dedup: DedupConfig,
}

/// Locations of the two harmonic datasets. Both must exist.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Record-oriented harmonic constituent database
    pub primary: PathBuf,
    /// Supplementary JSON global-model dataset
    pub secondary: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory shared by sibling processes; `None` disables persistence
    pub dir: Option<PathBuf>,
    pub enabled: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Phase 1 sampling step
    pub coarse_step_minutes: i64,
    /// Phase 2 resamples ± this many minutes around each coarse extremum
    pub fine_half_window_minutes: i64,
    /// Phase 2 sampling step, also used by the brute-force search
    pub fine_step_minutes: i64,
    /// Extra reference window on each side when remapping subordinate events
    pub subordinate_buffer_hours: i64,
    /// Use the coarse-to-fine search for event lists unless a caller overrides it
    pub use_optimizer: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Maximum latitude and longitude separation for one cluster (≈5 km)
    pub proximity_degrees: f64,
    /// Amplitude tolerance in SI units (m or m/s)
    pub amplitude_tolerance: f64,
    pub phase_tolerance_degrees: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sources: SourceConfig::default(),
            cache: CacheConfig::default(),
            prediction: PredictionConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            primary: PathBuf::from("data/harmonics.tdb"),
            secondary: PathBuf::from("data/global_stations.json"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            dir: Some(PathBuf::from("cache")),
            enabled: true,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig {
            coarse_step_minutes: 15,
            fine_half_window_minutes: 30,
            fine_step_minutes: 1,
            subordinate_buffer_hours: 2,
            use_optimizer: true,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            proximity_degrees: 0.05,
            amplitude_tolerance: 0.005,
            phase_tolerance_degrees: 0.1,
        }
    }
}

impl PredictionConfig {
    pub fn coarse_step(&self) -> Duration {
        Duration::minutes(self.coarse_step_minutes.max(1))
    }

    pub fn fine_half_window(&self) -> Duration {
        Duration::minutes(self.fine_half_window_minutes.max(1))
    }

    pub fn fine_step(&self) -> Duration {
        Duration::minutes(self.fine_step_minutes.max(1))
    }

    pub fn subordinate_buffer(&self) -> Duration {
        Duration::hours(self.subordinate_buffer_hours.max(0))
    }
}

impl EngineConfig {
    /// Configuration for the given source files with every other setting defaulted.
    pub fn with_sources(primary: impl Into<PathBuf>, secondary: impl Into<PathBuf>) -> Self {
        EngineConfig {
            sources: SourceConfig {
                primary: primary.into(),
                secondary: secondary.into(),
            },
            ..Self::default()
        }
    }

    /// Cache directory when persistence is enabled.
    pub fn cache_dir(&self) -> Option<&Path> {
        if self.cache.enabled {
            self.cache.dir.as_deref()
        } else {
            None
        }
    }

    /// Load configuration from tide-engine.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<EngineConfig>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded engine configuration");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Write configuration as pretty TOML.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}
