//! # On-Disk Cache
//!
//! Persists the merged station catalog and computed nodal-factor tables so that
//! restarts and sibling processes skip ingestion and astronomy.
//!
//! ## Layout
//!
//! ```text
//! <dir>/catalog-v1-<fingerprint>.json
//! <dir>/nodal-v1/<fingerprint[..16]>/<year>_<yyyymmdd>_<meridian>_<hour>.json
//! ```
//!
//! The fingerprint is a SHA-256 digest over the schema version and the bytes of both
//! source files, so editing either file, or changing the schema, selects fresh entries
//! and stale ones are simply never read again.
//!
//! ## Failure Handling
//!
//! Every file is written to a temporary sibling and renamed into place, so a reader
//! sees a complete file or none. Unreadable, corrupted or mismatched entries are logged
//! and treated as misses; a cache problem never fails a prediction.

use crate::constituents::ConstituentCatalog;
use crate::nodal::{NodalFactorSet, NodalKey};
use crate::station::StationCatalog;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Bumped whenever a persisted structure changes shape.
pub const SCHEMA_VERSION: u32 = 1;

/// Content fingerprint of both source files.
pub fn fingerprint(primary: &[u8], secondary: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SCHEMA_VERSION.to_le_bytes());
    // Length prefixes keep (ab, c) and (a, bc) apart
    hasher.update((primary.len() as u64).to_le_bytes());
    hasher.update(primary);
    hasher.update((secondary.len() as u64).to_le_bytes());
    hasher.update(secondary);
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Fingerprint two files by content.
pub fn fingerprint_files(primary: &Path, secondary: &Path) -> io::Result<String> {
    Ok(fingerprint(&fs::read(primary)?, &fs::read(secondary)?))
}

/// Persisted result of ingestion and deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub schema_version: u32,
    pub fingerprint: String,
    pub constituents: ConstituentCatalog,
    pub stations: StationCatalog,
}

/// Cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_path(&self, fingerprint: &str) -> PathBuf {
        self.root
            .join(format!("catalog-v{SCHEMA_VERSION}-{fingerprint}.json"))
    }

    pub fn nodal_path(&self, fingerprint: &str, key: &NodalKey) -> PathBuf {
        let short = fingerprint.get(..16).unwrap_or(fingerprint);
        self.root
            .join(format!("nodal-v{SCHEMA_VERSION}"))
            .join(short)
            .join(format!("{}.json", key.file_stem()))
    }

    /// Load the catalog persisted for `fingerprint`, if present and intact.
    pub fn load_catalog(&self, fingerprint: &str) -> Option<CatalogSnapshot> {
        let path = self.catalog_path(fingerprint);
        let snapshot: CatalogSnapshot = read_entry(&path)?;
        if snapshot.schema_version != SCHEMA_VERSION || snapshot.fingerprint != fingerprint {
            warn!(path = %path.display(), "catalog cache entry does not match its name, ignoring");
            return None;
        }
        debug!(
            path = %path.display(),
            stations = snapshot.stations.len(),
            "loaded station catalog from cache"
        );
        Some(snapshot)
    }

    pub fn store_catalog(&self, snapshot: &CatalogSnapshot) -> io::Result<()> {
        let path = self.catalog_path(&snapshot.fingerprint);
        write_atomic(&path, &serde_json::to_vec(snapshot)?)?;
        debug!(path = %path.display(), "persisted station catalog");
        Ok(())
    }

    /// Load a nodal-factor set, verifying it was stored under the same key.
    pub fn load_nodal(&self, fingerprint: &str, key: &NodalKey) -> Option<NodalFactorSet> {
        let path = self.nodal_path(fingerprint, key);
        let set: NodalFactorSet = read_entry(&path)?;
        if set.key != *key {
            warn!(path = %path.display(), "nodal cache entry holds a different key, ignoring");
            return None;
        }
        Some(set)
    }

    pub fn store_nodal(&self, fingerprint: &str, set: &NodalFactorSet) -> io::Result<()> {
        let path = self.nodal_path(fingerprint, &set.key);
        write_atomic(&path, &serde_json::to_vec(set)?)
    }
}

/// Read and decode one entry. Missing files are silent misses; anything else is
/// logged.
fn read_entry<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read cache entry");
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupted cache entry, recomputing");
            None
        }
    }
}

/// Write `data` to a temporary file beside `path`, then rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("cache path has no parent directory"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
