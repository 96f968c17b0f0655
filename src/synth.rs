//! # Harmonic Synthesis
//!
//! Reconstructs a station's water level or current velocity as the sum of its
//! constituent cosines:
//!
//! ```text
//! value(t) = datum + Σ f · A · cos(speed · t + V0 + u − phase)
//! ```
//!
//! where `t` is hours since the start of the local year (local standard time = UTC −
//! meridian offset). f, u and V0 come from the nodal-factor set of the sample's UTC day
//! and are fetched again only when that day changes.
//!
//! Subordinate stations have no constituents of their own; [`remap_events`] derives
//! their events from the reference station's by time offset and multiplier.

use crate::error::TideError;
use crate::nodal::{hours_since_year_start, NodalFactors, NodalKey};
use crate::station::{StationHarmonics, SubordinateOffsets};
use crate::{Event, EventKind, PredictionPoint, Units};
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Uniform instants from `start` through `end` inclusive.
pub fn time_grid(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Result<Vec<DateTime<Utc>>, TideError> {
    if step <= Duration::zero() {
        return Err(TideError::InvalidStep);
    }
    if end < start {
        return Err(TideError::InvalidWindow { start, end });
    }
    let step_ms = step.num_milliseconds().max(1);
    let count = (end - start).num_milliseconds() / step_ms;
    Ok((0..=count).map(|i| start + Duration::milliseconds(step_ms * i)).collect())
}

/// Anything that can be sampled on a uniform grid.
pub trait SeriesSource {
    fn units(&self) -> Units;

    /// Values at arbitrary instants, in the given order.
    fn sample(&self, times: &[DateTime<Utc>]) -> Vec<PredictionPoint>;

    fn series(&self, start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Result<Vec<PredictionPoint>, TideError> {
        Ok(self.sample(&time_grid(start, end, step)?))
    }
}

/// One constituent with its daily corrections folded in.
#[derive(Debug, Clone, Copy)]
struct ActiveTerm {
    speed: f64,
    /// f · A
    amplitude: f64,
    /// V0 + u − phase, degrees
    offset: f64,
}

/// Harmonic sum for a reference station.
pub struct ReferenceSeries<'a> {
    harmonics: &'a StationHarmonics,
    nodal: NodalFactors<'a>,
}

impl<'a> ReferenceSeries<'a> {
    /// Fails with [`TideError::EmptyConstituents`] when none of the station's terms
    /// resolve against the constituent catalog.
    pub fn new(station_id: &str, harmonics: &'a StationHarmonics, nodal: NodalFactors<'a>) -> Result<Self, TideError> {
        let catalog = nodal.catalog();
        let usable = harmonics.terms.iter().filter(|t| catalog.contains(&t.constituent)).count();
        if usable == 0 {
            return Err(TideError::EmptyConstituents(station_id.to_string()));
        }
        if usable < harmonics.terms.len() {
            warn!(
                station = station_id,
                dropped = harmonics.terms.len() - usable,
                "ignoring constituents missing from the catalog"
            );
        }
        Ok(ReferenceSeries { harmonics, nodal })
    }

    fn active_terms(&self, key: &NodalKey) -> Vec<ActiveTerm> {
        let set = self.nodal.get(key);
        let catalog = self.nodal.catalog();
        self.harmonics
            .terms
            .iter()
            .filter_map(|term| {
                let speed = catalog.get(&term.constituent)?.speed();
                let factor = set.get(&term.constituent)?;
                Some(ActiveTerm {
                    speed,
                    amplitude: factor.f * term.amplitude,
                    offset: factor.v0 + factor.u - term.phase,
                })
            })
            .collect()
    }
}

impl SeriesSource for ReferenceSeries<'_> {
    fn units(&self) -> Units {
        self.harmonics.units
    }

    fn sample(&self, times: &[DateTime<Utc>]) -> Vec<PredictionPoint> {
        let meridian = self.harmonics.meridian_minutes;
        let mut current: Option<(NodalKey, Vec<ActiveTerm>)> = None;

        times
            .iter()
            .map(|&time| {
                let key = NodalKey::for_instant(time, meridian);
                if current.as_ref().map_or(true, |(k, _)| *k != key) {
                    current = Some((key, self.active_terms(&key)));
                }
                let terms = current.as_ref().map(|(_, terms)| terms.as_slice()).unwrap_or_default();
                let t = hours_since_year_start(time, &key);
                let sum: f64 = terms
                    .iter()
                    .map(|term| term.amplitude * (term.speed * t + term.offset).to_radians().cos())
                    .sum();
                PredictionPoint {
                    time,
                    value: self.harmonics.datum_offset + sum,
                    units: self.harmonics.units,
                }
            })
            .collect()
    }
}

/// Apply subordinate offsets to reference events.
///
/// Maxima use the high offset and multiplier, minima the low ones. Slack keeps its
/// zero value and moves by the mean of the two offsets. Event types never change, even
/// when a negative multiplier flips the sign of the magnitude. The result is in time
/// order.
pub fn remap_events(events: &[Event], offsets: &SubordinateOffsets) -> Vec<Event> {
    let mut remapped: Vec<Event> = events
        .iter()
        .map(|event| {
            let (shift, value) = match event.kind {
                EventKind::High | EventKind::Flood => (offsets.high_offset(), event.value * offsets.high_multiplier),
                EventKind::Low | EventKind::Ebb => (offsets.low_offset(), event.value * offsets.low_multiplier),
                EventKind::Slack => (offsets.slack_offset(), event.value),
            };
            Event {
                time: event.time + shift,
                value,
                ..*event
            }
        })
        .collect();
    remapped.sort_by_key(|event| event.time);
    remapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constituents::ConstituentCatalog;
    use crate::nodal::NodalTable;
    use crate::station::tests::reference_station;
    use crate::station::HarmonicTerm;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn grid_is_inclusive_and_validated() {
        let grid = time_grid(at(0, 0), at(1, 0), Duration::minutes(15)).unwrap();
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[4], at(1, 0));
        assert!(matches!(time_grid(at(1, 0), at(0, 0), Duration::minutes(1)), Err(TideError::InvalidWindow { .. })));
        assert!(matches!(time_grid(at(0, 0), at(1, 0), Duration::zero()), Err(TideError::InvalidStep)));
        assert_eq!(time_grid(at(0, 0), at(0, 0), Duration::minutes(1)).unwrap().len(), 1);
    }

    #[test]
    fn synthesis_matches_closed_form() {
        let catalog = ConstituentCatalog::builtin();
        let table = NodalTable::new();
        let mut station = reference_station("harm:1", "Alpha");
        station.harmonics.datum_offset = 1.25;
        station.harmonics.meridian_minutes = 300;
        station.harmonics.terms = vec![
            HarmonicTerm { constituent: "M2".into(), amplitude: 2.0, phase: 45.0 },
            HarmonicTerm { constituent: "K1".into(), amplitude: 0.5, phase: 200.0 },
        ];
        let nodal = NodalFactors::new(&catalog, &table);
        let series = ReferenceSeries::new("harm:1", &station.harmonics, nodal).unwrap();

        let points = series.series(at(0, 0), at(23, 0), Duration::hours(1)).unwrap();
        assert_eq!(points.len(), 24);
        for point in points {
            let key = NodalKey::for_instant(point.time, 300);
            let set = nodal.get(&key);
            let t = hours_since_year_start(point.time, &key);
            let mut expected = 1.25;
            for (name, amp, phase) in [("M2", 2.0, 45.0), ("K1", 0.5, 200.0)] {
                let factor = set.get(name).unwrap();
                let speed = catalog.get(name).unwrap().speed();
                expected += factor.f * amp * ((speed * t + factor.v0 + factor.u - phase) * std::f64::consts::PI / 180.0).cos();
            }
            assert!((point.value - expected).abs() < 1e-9, "{}: {} vs {expected}", point.time, point.value);
        }
        // One nodal set per UTC day
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn day_change_fetches_new_factors() {
        let catalog = ConstituentCatalog::builtin();
        let table = NodalTable::new();
        let station = reference_station("harm:1", "Alpha");
        let series = ReferenceSeries::new("harm:1", &station.harmonics, NodalFactors::new(&catalog, &table)).unwrap();
        let points = series.series(at(22, 0), at(22, 0) + Duration::hours(4), Duration::minutes(30)).unwrap();
        assert_eq!(points.len(), 9);
        assert_eq!(table.len(), 2);

        // Continuity across midnight: neighbors within the M2 slope bound
        for pair in points.windows(2) {
            assert!((pair[1].value - pair[0].value).abs() < 0.3);
        }
    }

    #[test]
    fn station_without_known_constituents_is_rejected() {
        let catalog = ConstituentCatalog::builtin();
        let table = NodalTable::new();
        let mut station = reference_station("harm:1", "Alpha");
        station.harmonics.terms = vec![HarmonicTerm { constituent: "Q9".into(), amplitude: 1.0, phase: 0.0 }];
        let result = ReferenceSeries::new("harm:1", &station.harmonics, NodalFactors::new(&catalog, &table));
        assert!(matches!(result, Err(TideError::EmptyConstituents(id)) if id == "harm:1"));
    }

    fn offsets(high_s: i64, high_m: f64, low_s: i64, low_m: f64) -> SubordinateOffsets {
        SubordinateOffsets {
            reference: "ref".into(),
            high_offset_seconds: high_s,
            high_multiplier: high_m,
            low_offset_seconds: low_s,
            low_multiplier: low_m,
        }
    }

    fn reference_events() -> Vec<Event> {
        vec![
            Event { kind: EventKind::High, time: at(3, 0), value: 2.0, units: Units::Meters },
            Event { kind: EventKind::Low, time: at(9, 10), value: -1.5, units: Units::Meters },
            Event { kind: EventKind::High, time: at(15, 25), value: 1.8, units: Units::Meters },
        ]
    }

    #[test]
    fn identity_offsets_reproduce_reference() {
        let events = reference_events();
        assert_eq!(remap_events(&events, &offsets(0, 1.0, 0, 1.0)), events);
    }

    #[test]
    fn offsets_shift_and_scale_by_type() {
        let remapped = remap_events(&reference_events(), &offsets(1800, 1.1, -600, -1.0));
        assert_eq!(remapped[0].time, at(3, 30));
        assert!((remapped[0].value - 2.2).abs() < 1e-12);
        assert_eq!(remapped[1].kind, EventKind::Low);
        assert_eq!(remapped[1].time, at(9, 0));
        assert_eq!(remapped[1].value, 1.5);
    }

    #[test]
    fn slack_moves_by_mean_offset() {
        let slack = [Event { kind: EventKind::Slack, time: at(6, 0), value: 0.0, units: Units::Knots }];
        let remapped = remap_events(&slack, &offsets(1200, 2.0, -600, 3.0));
        assert_eq!(remapped[0].time, at(6, 5));
        assert_eq!(remapped[0].value, 0.0);
    }

    #[test]
    fn remapped_events_are_time_ordered() {
        // Large low offset pushes the low past the following high
        let remapped = remap_events(&reference_events(), &offsets(0, 1.0, 8 * 3600, 1.0));
        let kinds: Vec<_> = remapped.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [EventKind::High, EventKind::High, EventKind::Low]);
    }
}
