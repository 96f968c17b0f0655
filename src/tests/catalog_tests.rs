//! Catalog construction, deduplication and persistence through the engine.

use super::fixtures::*;
use crate::cache::{fingerprint, DiskCache};
use crate::nodal::NodalKey;
use crate::station::Provider;
use crate::TideEngine;
use chrono::{Duration, TimeZone, Utc};
use std::fs;
use tempfile::tempdir;

#[test]
fn duplicate_stations_share_one_record() {
    let dir = tempdir().unwrap();
    let engine = TideEngine::new(write_sources(dir.path(), PRIMARY_FIXTURE, SECONDARY_FIXTURE)).unwrap();

    let by_primary = engine.station(PORTLAND_PRIMARY_ID).unwrap().unwrap();
    let by_global = engine.station(PORTLAND_GLOBAL_ID).unwrap().unwrap();
    assert_eq!(by_primary, by_global);
    assert_eq!(by_primary.metadata.id, PORTLAND_GLOBAL_ID);
    assert_eq!(by_primary.metadata.provider, Provider::GlobalModel);
    assert_eq!(by_primary.aliases, [PORTLAND_PRIMARY_ID]);

    let start = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
    let end = start + Duration::days(1);
    assert_eq!(
        engine.predict_events(PORTLAND_PRIMARY_ID, start, end, true).unwrap(),
        engine.predict_events(PORTLAND_GLOBAL_ID, start, end, true).unwrap()
    );
}

#[test]
fn catalog_lists_canonical_stations_sorted() {
    let dir = tempdir().unwrap();
    let engine = TideEngine::new(write_sources(dir.path(), PRIMARY_FIXTURE, SECONDARY_FIXTURE)).unwrap();
    let stations = engine.stations().unwrap();

    // 7 parsable primary stations + 2 global, with Portland collapsed
    assert_eq!(stations.len(), 8);
    let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
    assert!(!stations.iter().any(|s| s.name == "Broken Row" || s.name == "Broken"));
    assert!(ids.contains(&"glob:cape-town"));
}

#[test]
fn current_bins_resolve_by_bin_and_base_id() {
    let dir = tempdir().unwrap();
    let engine = TideEngine::new(write_sources(dir.path(), PRIMARY_FIXTURE, SECONDARY_FIXTURE)).unwrap();
    let by_bin = engine.station(CURRENT_ID).unwrap().unwrap();
    let by_base = engine.station("harm:48.3000,-123.5000").unwrap().unwrap();
    assert_eq!(by_bin, by_base);
    assert_eq!(by_bin.metadata.depth, Some(10.0));

    let sub = engine.station(CURRENT_SUB_ID).unwrap().unwrap();
    assert_eq!(sub.harmonics.subordinate().unwrap().reference, CURRENT_ID);
}

#[test]
fn catalog_is_persisted_and_reused() {
    let dir = tempdir().unwrap();
    let config = write_sources(dir.path(), PRIMARY_FIXTURE, SECONDARY_FIXTURE);
    let cache = DiskCache::new(dir.path().join("cache"));
    let fp = fingerprint(PRIMARY_FIXTURE.as_bytes(), SECONDARY_FIXTURE.as_bytes());

    let first = TideEngine::new(config.clone()).unwrap();
    let stations = first.stations().unwrap();
    assert!(cache.catalog_path(&fp).is_file());

    let snapshot = cache.load_catalog(&fp).unwrap();
    assert_eq!(snapshot.stations.len(), stations.len());

    let second = TideEngine::new(config).unwrap();
    let reloaded = second.stations().unwrap();
    let ids = |list: &[crate::station::StationMetadata]| list.iter().map(|s| s.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&reloaded), ids(&stations));
    assert!(second.station(PORTLAND_PRIMARY_ID).unwrap().is_some());
}

#[test]
fn corrupted_catalog_cache_falls_back_to_ingestion() {
    let dir = tempdir().unwrap();
    let config = write_sources(dir.path(), PRIMARY_FIXTURE, SECONDARY_FIXTURE);
    let cache = DiskCache::new(dir.path().join("cache"));
    let fp = fingerprint(PRIMARY_FIXTURE.as_bytes(), SECONDARY_FIXTURE.as_bytes());

    fs::create_dir_all(cache.root()).unwrap();
    fs::write(cache.catalog_path(&fp), b"{\"schema_version\": 1, \"truncated").unwrap();

    let engine = TideEngine::new(config).unwrap();
    assert_eq!(engine.stations().unwrap().len(), 8);
    // The rebuilt catalog replaced the corrupted file
    assert!(cache.load_catalog(&fp).is_some());
}

#[test]
fn editing_a_source_invalidates_the_catalog() {
    let dir = tempdir().unwrap();
    let config = write_sources(dir.path(), PRIMARY_FIXTURE, SECONDARY_FIXTURE);
    assert_eq!(TideEngine::new(config).unwrap().stations().unwrap().len(), 8);

    let edited = format!("{PRIMARY_FIXTURE}STATION|9|New Pier|20.0|20.0|UTC|m|0|+00:00||\nHARM|9|M2|1.0|0\n");
    let config = write_sources(dir.path(), &edited, SECONDARY_FIXTURE);
    let engine = TideEngine::new(config).unwrap();
    assert_eq!(engine.stations().unwrap().len(), 9);

    let catalogs = fs::read_dir(dir.path().join("cache"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("catalog-"))
        .count();
    assert_eq!(catalogs, 2);
}

#[test]
fn nodal_tables_are_persisted_and_survive_corruption() {
    let dir = tempdir().unwrap();
    let config = write_sources(dir.path(), PRIMARY_FIXTURE, SECONDARY_FIXTURE);
    let cache = DiskCache::new(dir.path().join("cache"));
    let fp = fingerprint(PRIMARY_FIXTURE.as_bytes(), SECONDARY_FIXTURE.as_bytes());
    let instant = Utc.with_ymd_and_hms(2024, 3, 15, 6, 0, 0).unwrap();
    let key = NodalKey::for_instant(instant, 300);

    let engine = TideEngine::new(config.clone()).unwrap();
    let computed = engine.nodal_factors(&key).unwrap();
    let path = cache.nodal_path(&fp, &key);
    assert!(path.is_file());

    fs::write(&path, b"garbage").unwrap();
    let fresh = TideEngine::new(config).unwrap();
    let recomputed = fresh.nodal_factors(&key).unwrap();
    let (a, b) = (computed.get("M2").unwrap(), recomputed.get("M2").unwrap());
    assert!((a.f - b.f).abs() < 1e-12);
    assert!((a.v0 - b.v0).abs() < 1e-9);
    assert!(cache.load_nodal(&fp, &key).is_some());
}
