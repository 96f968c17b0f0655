//! # Error Taxonomy
//!
//! Only [`TideError::MissingSourceData`] is fatal for the engine. Unknown stations and
//! stations without usable constituents degrade to empty results at the public
//! prediction operations, malformed source rows are skipped during ingestion, and
//! cache failures fall back to recomputation.

use chrono::{DateTime, Utc};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors raised by ingestion, caching and prediction.
#[derive(Error, Debug)]
pub enum TideError {
    /// One or both required source files are absent
    #[error("missing source data: {}", display_paths(.missing))]
    MissingSourceData { missing: Vec<PathBuf> },

    /// No station matches the requested id or alias
    #[error("unknown station: {0}")]
    UnknownStation(String),

    /// The station exists but has no harmonic terms resolvable against the catalog
    #[error("station {0} has no usable harmonic constituents")]
    EmptyConstituents(String),

    /// A single source row could not be parsed
    #[error("{source_name}:{line}: malformed row: {reason}")]
    MalformedSourceRow {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// Prediction window ends before it starts
    #[error("invalid window: {start} .. {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Step size must be strictly positive
    #[error("step size must be positive")]
    InvalidStep,

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl TideError {
    /// Construct a [`TideError::MalformedSourceRow`].
    pub fn malformed(source_name: &str, line: usize, reason: impl Into<String>) -> Self {
        TideError::MalformedSourceRow {
            source_name: source_name.to_string(),
            line,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_names_every_file() {
        let err = TideError::MissingSourceData {
            missing: vec![
                PathBuf::from("/data/harmonics.tdb"),
                PathBuf::from("/data/global.json"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/harmonics.tdb"), "{msg}");
        assert!(msg.contains("/data/global.json"), "{msg}");
    }

    #[test]
    fn malformed_row_mentions_location() {
        let err = TideError::malformed("harmonics.tdb", 42, "bad amplitude");
        assert_eq!(err.to_string(), "harmonics.tdb:42: malformed row: bad amplitude");
    }
}
