//! # Peak Detection
//!
//! Local extrema of a sampled series, refined with a three-point parabola, and linear
//! zero-crossing interpolation for slack water.

use crate::{Event, EventKind, PredictionPoint};
use chrono::Duration;

/// Input to [`detect_peaks`].
#[derive(Debug, Clone, Copy)]
pub enum PeakInput<'a> {
    /// Raw synthesized samples
    Samples(&'a [PredictionPoint]),
    /// Events that already carry a type, e.g. refined reference-station peaks
    Tagged(&'a [Event]),
}

/// Find local extrema and refine each to the vertex of the parabola through it and its
/// two neighbors.
///
/// A sample is a maximum when strictly greater than both neighbors and a minimum when
/// strictly lesser. Fewer than three samples or monotonic input yield nothing. Tagged
/// input is returned unchanged.
pub fn detect_peaks(input: PeakInput<'_>) -> Vec<Event> {
    let samples = match input {
        PeakInput::Tagged(events) => return events.to_vec(),
        PeakInput::Samples(samples) => samples,
    };
    if samples.len() < 3 {
        return Vec::new();
    }

    samples
        .windows(3)
        .filter_map(|w| {
            let (a, b, c) = (&w[0], &w[1], &w[2]);
            let kind = if b.value > a.value && b.value > c.value {
                EventKind::maximum(b.units)
            } else if b.value < a.value && b.value < c.value {
                EventKind::minimum(b.units)
            } else {
                return None;
            };
            let (time, value) = refine(a, b, c);
            Some(Event {
                kind,
                time,
                value,
                units: b.units,
            })
        })
        .collect()
}

/// Vertex of the quadratic through three samples.
///
/// Offsets are measured in half the outer span, so uneven spacing shifts the vertex in
/// proportion to the real time between the outer samples.
fn refine(a: &PredictionPoint, b: &PredictionPoint, c: &PredictionPoint) -> (chrono::DateTime<chrono::Utc>, f64) {
    let (y0, y1, y2) = (a.value, b.value, c.value);
    let curvature = y0 - 2.0 * y1 + y2;
    if curvature == 0.0 || !curvature.is_finite() {
        return (b.time, y1);
    }
    let delta = (0.5 * (y0 - y2) / curvature).clamp(-1.0, 1.0);
    let value = y1 - 0.25 * (y0 - y2) * delta;
    let half_span_ms = (c.time - a.time).num_milliseconds() as f64 / 2.0;
    let shift = Duration::milliseconds((delta * half_span_ms).round() as i64);
    (b.time + shift, value)
}

/// Slack events where consecutive samples change sign.
///
/// The crossing is placed between the two samples' actual timestamps in proportion
/// to |first| / (|first| + |second|). A sample that is exactly zero is itself a
/// crossing when its neighbors have opposite signs.
pub fn zero_crossings(points: &[PredictionPoint]) -> Vec<Event> {
    let mut events = Vec::new();
    let mut i = 0;
    while i + 1 < points.len() {
        let (a, b) = (&points[i], &points[i + 1]);
        if a.value * b.value < 0.0 {
            let weight = a.value.abs() / (a.value.abs() + b.value.abs());
            let span_ms = (b.time - a.time).num_milliseconds() as f64;
            events.push(Event {
                kind: EventKind::Slack,
                time: a.time + Duration::milliseconds((weight * span_ms).round() as i64),
                value: 0.0,
                units: a.units,
            });
        } else if b.value == 0.0 && a.value != 0.0 {
            if let Some(c) = points.get(i + 2) {
                if a.value * c.value < 0.0 {
                    events.push(Event {
                        kind: EventKind::Slack,
                        time: b.time,
                        value: 0.0,
                        units: b.units,
                    });
                    i += 1;
                }
            }
        }
        i += 1;
    }
    events
}
