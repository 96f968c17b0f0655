//! # Tide Engine Core Library
//!
//! Offline harmonic prediction of tide heights and tidal currents. Given published
//! harmonic constants for a station (amplitude and phase per constituent), the engine
//! reconstructs the water level or current velocity time series and derives refined
//! high/low (flood/ebb/slack) events without calling any live service.
//!
//! ## Pipeline
//!
//! 1. **Ingest**: two source formats ([`ingest`]) produce one normalized record shape
//! 2. **Deduplicate**: overlapping stations from both sources collapse to canonical
//!    entries ([`dedup`]), aliases redirect to the canonical record
//! 3. **Astronomy**: fundamental ephemeris angles ([`astro`]) feed per-day nodal
//!    corrections f, u and V0 ([`nodal`])
//! 4. **Synthesis**: harmonic summation ([`synth`]) produces a raw series
//! 5. **Events**: local extrema with parabolic refinement and zero-crossing
//!    interpolation ([`peaks`]), driven by a coarse-to-fine search ([`optimizer`])
//!
//! The merged station catalog and nodal tables are persisted through [`cache`], keyed
//! by a content fingerprint of both source files.
//!
//! ## Core Types
//!
//! - [`PredictionPoint`]: one synthesized value at an instant
//! - [`Event`]: a refined high/low/flood/ebb/slack event
//! - [`TideEngine`]: the long-lived context object owning all caches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod astro;
pub mod cache;
pub mod config;
pub mod constituents;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod nodal;
pub mod optimizer;
pub mod peaks;
pub mod station;
pub mod synth;

#[cfg(test)]
mod tests;

pub use engine::{EngineCell, TideEngine};
pub use error::TideError;

/// Measurement units of a station's harmonic constants.
///
/// Heights use length units, tidal currents use speed units. Amplitudes from
/// different sources are compared after conversion with [`Units::to_si`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    Feet,
    Meters,
    Knots,
    MetersPerSecond,
}

impl Units {
    /// Parse the unit spellings found in both source formats.
    ///
    /// ```
    /// use tide_engine::Units;
    ///
    /// assert_eq!(Units::parse("ft"), Some(Units::Feet));
    /// assert_eq!(Units::parse("Knots"), Some(Units::Knots));
    /// assert_eq!(Units::parse("furlongs"), None);
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ft" | "feet" | "foot" => Some(Units::Feet),
            "m" | "meter" | "meters" | "metre" | "metres" => Some(Units::Meters),
            "kt" | "kts" | "knot" | "knots" => Some(Units::Knots),
            "m/s" | "mps" | "meters/second" | "meters per second" => Some(Units::MetersPerSecond),
            _ => None,
        }
    }

    /// True for current (speed) units.
    pub fn is_current(self) -> bool {
        matches!(self, Units::Knots | Units::MetersPerSecond)
    }

    /// Conversion factor to meters or meters/second.
    pub fn to_si(self) -> f64 {
        match self {
            Units::Feet => 0.3048,
            Units::Meters => 1.0,
            Units::Knots => 1852.0 / 3600.0,
            Units::MetersPerSecond => 1.0,
        }
    }

    /// Multiplier taking a value in `self` to `target`, or `None` when one is a
    /// height unit and the other a speed unit.
    ///
    /// ```
    /// use tide_engine::Units;
    ///
    /// let factor = Units::Meters.factor_to(Units::Feet).unwrap();
    /// assert!((3.0 * factor - 9.842_519_685).abs() < 1e-6);
    /// assert_eq!(Units::Knots.factor_to(Units::Knots), Some(1.0));
    /// assert_eq!(Units::Feet.factor_to(Units::Knots), None);
    /// ```
    pub fn factor_to(self, target: Units) -> Option<f64> {
        if self == target {
            return Some(1.0);
        }
        (self.is_current() == target.is_current()).then(|| self.to_si() / target.to_si())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Units::Feet => "ft",
            Units::Meters => "m",
            Units::Knots => "kt",
            Units::MetersPerSecond => "m/s",
        }
    }
}

/// Event classification.
///
/// Height stations produce `High`/`Low`; current stations produce `Flood`
/// (maximum signed velocity), `Ebb` (minimum signed velocity) and `Slack`
/// (velocity zero crossing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    High,
    Low,
    Flood,
    Ebb,
    Slack,
}

impl EventKind {
    /// Kind assigned to a local maximum of a series in `units`.
    pub fn maximum(units: Units) -> Self {
        if units.is_current() {
            EventKind::Flood
        } else {
            EventKind::High
        }
    }

    /// Kind assigned to a local minimum of a series in `units`.
    pub fn minimum(units: Units) -> Self {
        if units.is_current() {
            EventKind::Ebb
        } else {
            EventKind::Low
        }
    }

    /// True for the kinds produced at local maxima.
    pub fn is_maximum(self) -> bool {
        matches!(self, EventKind::High | EventKind::Flood)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::High => "High",
            EventKind::Low => "Low",
            EventKind::Flood => "Flood",
            EventKind::Ebb => "Ebb",
            EventKind::Slack => "Slack",
        }
    }
}

/// A single synthesized value.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use tide_engine::{PredictionPoint, Units};
///
/// let point = PredictionPoint {
///     time: Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
///     value: 3.2,
///     units: Units::Feet,
/// };
/// assert!(!point.units.is_current());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
    pub units: Units,
}

/// A refined tide or current event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Refined instant of the extremum or crossing
    pub time: DateTime<Utc>,
    /// Refined magnitude (height or signed velocity)
    pub value: f64,
    pub units: Units,
}

impl Event {
    /// View this event as a series point, e.g. for zero-crossing search over a
    /// remapped subordinate series.
    pub fn as_point(&self) -> PredictionPoint {
        PredictionPoint {
            time: self.time,
            value: self.value,
            units: self.units,
        }
    }
}
