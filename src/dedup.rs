//! # Station Deduplication
//!
//! Both sources cover overlapping coastline, so the same physical station often appears
//! twice. Records are grouped by a normalized name key, clustered by proximity within a
//! group, and each cluster is split into subsets whose constituents agree within
//! tolerance. A subset of several records collapses to one canonical [`Station`]; the
//! other records' ids become its aliases.
//!
//! Proximate same-named records whose constituents differ are all kept and reported as
//! ambiguous at `info`.

use crate::config::DedupConfig;
use crate::station::{HarmonicTerm, Provider, Station, StationRecord};
use std::collections::BTreeMap;
use tracing::info;

/// Result of one deduplication pass.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub stations: Vec<Station>,
    /// Records folded into another record
    pub collapsed: usize,
    /// Clusters left with more than one distinct record
    pub ambiguous: usize,
}

/// Lowercase with everything but ASCII letters and digits stripped.
///
/// ```
/// use tide_engine::dedup::normalized_name;
///
/// assert_eq!(normalized_name("Seattle, WA (Pier 54)"), "seattlewapier54");
/// ```
pub fn normalized_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Collapse duplicate records into canonical stations.
pub fn deduplicate(records: Vec<StationRecord>, config: &DedupConfig) -> DedupOutcome {
    let total = records.len();

    // Current bins at different depths are different stations
    let mut groups: BTreeMap<(String, Option<i64>), Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        let depth = record.metadata.depth.map(|d| (d * 10.0).round() as i64);
        groups
            .entry((normalized_name(&record.metadata.name), depth))
            .or_default()
            .push(i);
    }

    let mut outcome = DedupOutcome::default();
    let mut slots: Vec<Option<StationRecord>> = records.into_iter().map(Some).collect();

    for members in groups.values() {
        for cluster in proximity_clusters(members, &slots, config.proximity_degrees) {
            let subsets = identical_subsets(&cluster, &slots, config);
            if subsets.len() > 1 {
                outcome.ambiguous += 1;
                let ids: Vec<&str> = cluster
                    .iter()
                    .filter_map(|&i| slots[i].as_ref())
                    .map(|r| r.metadata.lookup_key())
                    .collect();
                info!(
                    name = %slots[cluster[0]].as_ref().map(|r| r.metadata.name.as_str()).unwrap_or_default(),
                    stations = ?ids,
                    "proximate stations with differing constituents kept separate"
                );
            }
            for subset in subsets {
                let taken: Vec<StationRecord> = subset.iter().filter_map(|&i| slots[i].take()).collect();
                outcome.collapsed += taken.len().saturating_sub(1);
                if let Some(station) = collapse(taken) {
                    outcome.stations.push(station);
                }
            }
        }
    }

    info!(
        records = total,
        stations = outcome.stations.len(),
        collapsed = outcome.collapsed,
        ambiguous = outcome.ambiguous,
        "deduplicated station records"
    );
    outcome
}

/// Single-linkage clusters: records within `limit` degrees in both latitude and
/// longitude of any member join that member's cluster.
fn proximity_clusters(members: &[usize], slots: &[Option<StationRecord>], limit: f64) -> Vec<Vec<usize>> {
    let near = |a: usize, b: usize| match (&slots[a], &slots[b]) {
        (Some(a), Some(b)) => {
            (a.metadata.latitude - b.metadata.latitude).abs() <= limit
                && (a.metadata.longitude - b.metadata.longitude).abs() <= limit
        }
        _ => false,
    };

    // Union-find over the group
    let mut parent: Vec<usize> = (0..members.len()).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for a in 0..members.len() {
        for b in a + 1..members.len() {
            if near(members[a], members[b]) {
                let (ra, rb) = (root(&mut parent, a), root(&mut parent, b));
                if ra != rb {
                    parent[rb.max(ra)] = ra.min(rb);
                }
            }
        }
    }

    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..members.len() {
        let r = root(&mut parent, i);
        clusters.entry(r).or_default().push(members[i]);
    }
    clusters.into_values().collect()
}

/// Partition a cluster into subsets of mutually identical records.
fn identical_subsets(cluster: &[usize], slots: &[Option<StationRecord>], config: &DedupConfig) -> Vec<Vec<usize>> {
    let mut subsets: Vec<Vec<usize>> = Vec::new();
    for &i in cluster {
        let Some(record) = &slots[i] else { continue };
        let home = subsets.iter_mut().find(|subset| {
            slots[subset[0]]
                .as_ref()
                .is_some_and(|first| constituents_identical(first, record, config))
        });
        match home {
            Some(subset) => subset.push(i),
            None => subsets.push(vec![i]),
        }
    }
    subsets
}

/// Same kind, same constituent names, amplitudes (in SI units) and phases within
/// tolerance.
pub fn constituents_identical(a: &StationRecord, b: &StationRecord, config: &DedupConfig) -> bool {
    let (ha, hb) = (&a.harmonics, &b.harmonics);
    if ha.kind != hb.kind || ha.units.is_current() != hb.units.is_current() {
        return false;
    }
    if ha.terms.len() != hb.terms.len() {
        return false;
    }
    let sorted = |terms: &[HarmonicTerm]| {
        let mut terms = terms.to_vec();
        terms.sort_by(|x, y| x.constituent.cmp(&y.constituent));
        terms
    };
    let (ta, tb) = (sorted(&ha.terms), sorted(&hb.terms));
    let (sa, sb) = (ha.units.to_si(), hb.units.to_si());

    ta.iter().zip(tb.iter()).all(|(x, y)| {
        let phase_gap = (x.phase - y.phase).rem_euclid(360.0);
        x.constituent == y.constituent
            && (x.amplitude * sa - y.amplitude * sb).abs() <= config.amplitude_tolerance
            && phase_gap.min(360.0 - phase_gap) <= config.phase_tolerance_degrees
    })
}

/// Keep the preferred record and turn the others into aliases.
fn collapse(mut records: Vec<StationRecord>) -> Option<Station> {
    records.sort_by(|a, b| {
        let global_first = |r: &StationRecord| r.metadata.provider != Provider::GlobalModel;
        global_first(a)
            .cmp(&global_first(b))
            .then_with(|| a.metadata.name.chars().count().cmp(&b.metadata.name.chars().count()))
            .then_with(|| a.metadata.id.cmp(&b.metadata.id))
            .then_with(|| a.metadata.lookup_key().cmp(b.metadata.lookup_key()))
    });
    let mut records = records.into_iter();
    let mut canonical = Station::from(records.next()?);

    for duplicate in records {
        for alias in [Some(duplicate.metadata.id), duplicate.metadata.bin_id].into_iter().flatten() {
            if alias != canonical.metadata.id
                && Some(&alias) != canonical.metadata.bin_id.as_ref()
                && !canonical.aliases.contains(&alias)
            {
                canonical.aliases.push(alias);
            }
        }
    }
    Some(canonical)
}
