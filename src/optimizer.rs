//! # Coarse-to-Fine Event Search
//!
//! Minute-resolution synthesis over a multi-month window costs one harmonic sum per
//! minute. The search here samples the window coarsely (15 minutes by default), finds
//! approximate extrema, and resamples only a narrow window (±30 minutes) around each
//! at the fine step before running [`detect_peaks`]. For a semi-diurnal station that
//! is roughly 96 + 4 × 61 samples per day instead of 1440.
//!
//! Current stations also get slack water: coarse sign changes are bracketed and the
//! crossing is interpolated again on a fine resample of the bracket.
//!
//! Subordinate stations reuse their reference station's events. [`ReferencePeakCache`]
//! keeps those per reference station and calendar month so every subordinate of one
//! reference shares a single search.

use crate::config::PredictionConfig;
use crate::error::TideError;
use crate::peaks::{detect_peaks, zero_crossings, PeakInput};
use crate::synth::SeriesSource;
use crate::{Event, EventKind, PredictionPoint};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Step sizes of the two search phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub coarse_step: Duration,
    pub fine_half_window: Duration,
    pub fine_step: Duration,
}

impl SearchSettings {
    pub fn from_config(config: &PredictionConfig) -> Self {
        SearchSettings {
            coarse_step: config.coarse_step(),
            fine_half_window: config.fine_half_window(),
            fine_step: config.fine_step(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&PredictionConfig::default())
    }
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), TideError> {
    if end < start {
        Err(TideError::InvalidWindow { start, end })
    } else {
        Ok(())
    }
}

/// Events in `[start, end)`, time ordered.
fn finish(mut events: Vec<Event>, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Event> {
    events.retain(|e| e.time >= start && e.time < end);
    events.sort_by_key(|e| e.time);
    events
}

/// Reference search: fine sampling over the whole window.
pub fn find_events_brute_force(
    source: &dyn SeriesSource,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    settings: &SearchSettings,
) -> Result<Vec<Event>, TideError> {
    check_window(start, end)?;
    let pad = settings.fine_step;
    let series = source.series(start - pad, end + pad, settings.fine_step)?;
    let mut events = detect_peaks(PeakInput::Samples(&series));
    if source.units().is_current() {
        events.extend(zero_crossings(&series));
    }
    Ok(finish(events, start, end))
}

/// Two-phase search. Matches [`find_events_brute_force`] to within one fine step.
pub fn find_events_optimized(
    source: &dyn SeriesSource,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    settings: &SearchSettings,
) -> Result<Vec<Event>, TideError> {
    check_window(start, end)?;
    let pad = settings.coarse_step;
    let coarse = source.series(start - pad, end + pad, settings.coarse_step)?;
    let mut samples = coarse.len();

    let mut events: Vec<Event> = Vec::new();
    for (kind, estimate) in coarse_extrema(&coarse) {
        let fine = source.series(
            estimate - settings.fine_half_window,
            estimate + settings.fine_half_window,
            settings.fine_step,
        )?;
        samples += fine.len();
        let refined = detect_peaks(PeakInput::Samples(&fine))
            .into_iter()
            .filter(|e| e.kind == kind)
            .min_by_key(|e| (e.time - estimate).num_milliseconds().abs());
        if let Some(event) = refined {
            // Two coarse estimates can refine onto one extremum
            let duplicate = events
                .iter()
                .any(|e| e.kind == event.kind && (e.time - event.time).num_milliseconds().abs() < settings.fine_step.num_milliseconds());
            if !duplicate {
                events.push(event);
            }
        }
    }

    if source.units().is_current() {
        for (a, b) in sign_change_brackets(&coarse) {
            let fine = source.series(a.time, b.time, settings.fine_step)?;
            samples += fine.len();
            let crossing = zero_crossings(&fine)
                .into_iter()
                .next()
                .or_else(|| zero_crossings(&[*a, *b]).into_iter().next());
            events.extend(crossing);
        }
    }

    debug!(
        samples,
        brute_force = (end - start).num_minutes() / settings.fine_step.num_minutes().max(1),
        events = events.len(),
        "coarse-to-fine search"
    );
    Ok(finish(events, start, end))
}

/// Strict extrema of the coarse scan, without refinement.
fn coarse_extrema(coarse: &[PredictionPoint]) -> Vec<(EventKind, DateTime<Utc>)> {
    coarse
        .windows(3)
        .filter_map(|w| {
            let (a, b, c) = (w[0].value, w[1].value, w[2].value);
            if b > a && b > c {
                Some((EventKind::maximum(w[1].units), w[1].time))
            } else if b < a && b < c {
                Some((EventKind::minimum(w[1].units), w[1].time))
            } else {
                None
            }
        })
        .collect()
}

/// Consecutive coarse samples whose signs differ, folding an exact zero into the pair
/// that spans it.
fn sign_change_brackets(coarse: &[PredictionPoint]) -> Vec<(&PredictionPoint, &PredictionPoint)> {
    let mut brackets = Vec::new();
    let mut last_nonzero: Option<&PredictionPoint> = None;
    for point in coarse {
        if point.value == 0.0 {
            continue;
        }
        if let Some(prev) = last_nonzero {
            if prev.value * point.value < 0.0 {
                brackets.push((prev, point));
            }
        }
        last_nonzero = Some(point);
    }
    brackets
}

/// First instant of the UTC month containing `instant`.
pub fn month_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(instant.year(), instant.month(), 1).unwrap_or(instant.date_naive());
    first.and_time(NaiveTime::default()).and_utc()
}

fn next_month(start: DateTime<Utc>) -> DateTime<Utc> {
    // Day 32 always lands in the following month
    month_start(month_start(start) + Duration::days(32))
}

/// Half-open calendar-month windows covering `[start, end]`.
pub fn month_windows(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::new();
    let mut cursor = month_start(start);
    while cursor <= end {
        let next = next_month(cursor);
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MonthKey {
    station: String,
    month: DateTime<Utc>,
}

/// Reference-station events per calendar month, shared across subordinates.
#[derive(Debug, Default)]
pub struct ReferencePeakCache {
    entries: RwLock<HashMap<MonthKey, Arc<Vec<Event>>>>,
}

impl ReferencePeakCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached events of `station` for the month opening at `month`, computing them on a
    /// miss. Concurrent misses may both compute; the first stored result wins.
    pub fn get_or_compute<F>(&self, station: &str, month: DateTime<Utc>, compute: F) -> Result<Arc<Vec<Event>>, TideError>
    where
        F: FnOnce() -> Result<Vec<Event>, TideError>,
    {
        let key = MonthKey {
            station: station.to_string(),
            month,
        };
        if let Some(events) = self.entries.read().get(&key) {
            debug!(station, month = %month.format("%Y-%m"), "reference peak cache hit");
            return Ok(Arc::clone(events));
        }
        let events = Arc::new(compute()?);
        let mut entries = self.entries.write();
        Ok(Arc::clone(entries.entry(key).or_insert(events)))
    }

    /// Drop months that end before `from` or open more than one month after the month
    /// containing `to`.
    pub fn prune_outside(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
        let horizon = next_month(to);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| next_month(key.month) > from && key.month <= horizon);
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!(pruned, from = %from, to = %to, "pruned reference peak cache");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
