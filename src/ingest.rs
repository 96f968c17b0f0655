//! # Source Ingestion
//!
//! Two format-specific parsers produce the same normalized [`StationRecord`] shape:
//!
//! - [`parse_primary`]: the record-oriented harmonic database. Pipe-separated rows
//!   tagged `CONST`, `STATION`, `HARM` and `SUB`, keyed by a database-internal
//!   station index that never leaves this module.
//! - [`parse_secondary`]: the JSON global-model dataset, an array of station objects
//!   with embedded constituent lists and pre-computed datum offsets.
//!
//! ## Row handling
//!
//! A row that cannot be parsed is a [`TideError::MalformedSourceRow`]: it is logged at
//! `warn` with its file and line and skipped, and the rest of the file is still
//! processed. Harmonic terms naming constituents the catalog does not know are dropped
//! the same way.
//!
//! ## Station ids
//!
//! Ids are derived from coordinates rounded to four decimals, so re-ingesting the same
//! file yields the same ids. Current stations observed at several depths get a
//! bin/depth-qualified id (`<id>@<depth>m`) which also serves as their lookup key.

use crate::astro::normalize_degrees;
use crate::constituents::{
    compound_speed, BasicConstituent, CompoundConstituent, Constituent, ConstituentCatalog,
    NodeFactorFormula, BASE_CONSTITUENTS, BASE_COUNT,
};
use crate::error::TideError;
use crate::station::{
    HarmonicTerm, Provider, StationHarmonics, StationKind, StationMetadata, StationRecord,
    SubordinateOffsets,
};
use crate::Units;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Id prefix of stations from the harmonic database.
pub const PRIMARY_PREFIX: &str = "harm";
/// Id prefix of stations from the global-model dataset.
pub const SECONDARY_PREFIX: &str = "glob";

/// Deterministic id from rounded coordinates.
///
/// ```
/// use tide_engine::ingest::coordinate_id;
///
/// assert_eq!(coordinate_id("harm", 47.602_61, -122.339_34), "harm:47.6026,-122.3393");
/// ```
pub fn coordinate_id(prefix: &str, latitude: f64, longitude: f64) -> String {
    format!("{prefix}:{:.4},{:.4}", round4(latitude), round4(longitude))
}

/// Bin/depth-qualified id.
pub fn bin_id(base: &str, depth: f64) -> String {
    format!("{base}@{depth:.1}m")
}

fn round4(value: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    // Avoid "-0.0000"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Largest accepted meridian offset, minutes.
pub const MAX_MERIDIAN_MINUTES: i32 = 24 * 60;

/// Largest accepted subordinate time offset, minutes.
pub const MAX_OFFSET_MINUTES: f64 = 24.0 * 60.0;

/// Parse `±HH:MM` or decimal hours into minutes, within ±24 h.
pub fn parse_meridian(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    let total = if let Some((hours, minutes)) = raw.split_once(':') {
        let negative = hours.trim_start().starts_with('-');
        let h: i32 = hours.trim().trim_start_matches(['+', '-']).parse().ok()?;
        let m: i32 = minutes.trim().parse().ok()?;
        if !(0..60).contains(&m) {
            return None;
        }
        let total = h.checked_mul(60)?.checked_add(m)?;
        if negative {
            -total
        } else {
            total
        }
    } else {
        let hours: f64 = raw.parse().ok()?;
        if !hours.is_finite() || hours.abs() * 60.0 > MAX_MERIDIAN_MINUTES as f64 {
            return None;
        }
        (hours * 60.0).round() as i32
    };
    (total.abs() <= MAX_MERIDIAN_MINUTES).then_some(total)
}

// -- Primary harmonic database --

enum Row {
    Const(Constituent),
    Station(StationRow),
    Harm(HarmRow),
    Sub(SubRow),
}

struct StationRow {
    index: String,
    name: String,
    latitude: f64,
    longitude: f64,
    timezone: String,
    units: Units,
    datum_offset: f64,
    meridian_minutes: i32,
    region: Option<String>,
    depth: Option<f64>,
}

struct HarmRow {
    index: String,
    constituent: String,
    amplitude: f64,
    phase: f64,
}

struct SubRow {
    index: String,
    reference: String,
    high_offset_minutes: f64,
    high_multiplier: f64,
    low_offset_minutes: f64,
    low_multiplier: f64,
}

/// Parse the record-oriented harmonic database.
///
/// `CONST` rows are applied to `catalog` before any harmonic row is resolved, so a
/// station may use a constituent defined anywhere in the same file.
pub fn parse_primary(
    text: &str,
    source_name: &str,
    catalog: &mut ConstituentCatalog,
) -> Vec<StationRecord> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_row(trimmed, catalog) {
            Ok(row) => rows.push((line_no, row)),
            Err(reason) => warn_malformed(source_name, line_no, reason),
        }
    }

    let discovered: Vec<Constituent> = rows
        .iter()
        .filter_map(|(_, row)| match row {
            Row::Const(c) => Some(c.clone()),
            _ => None,
        })
        .collect();
    let added = catalog.extend(discovered);
    if added > 0 {
        debug!(added, source = source_name, "extended constituent catalog");
    }

    // index -> position in `records`
    let mut by_index: HashMap<String, usize> = HashMap::new();
    let mut records: Vec<StationRecord> = Vec::new();
    let mut taken_keys: HashSet<String> = HashSet::new();

    for (line_no, row) in &rows {
        if let Row::Station(station) = row {
            if by_index.contains_key(&station.index) {
                warn_malformed(source_name, *line_no, format!("duplicate station index {}", station.index));
                continue;
            }
            let record = station_record(station, Provider::HarmonicDatabase, None, &mut taken_keys);
            by_index.insert(station.index.clone(), records.len());
            records.push(record);
        }
    }

    for (line_no, row) in &rows {
        match row {
            Row::Harm(harm) => {
                let Some(&pos) = by_index.get(&harm.index) else {
                    warn_malformed(source_name, *line_no, format!("unknown station index {}", harm.index));
                    continue;
                };
                let Some(constituent) = catalog.resolve(&harm.constituent) else {
                    warn_malformed(source_name, *line_no, format!("unknown constituent {}", harm.constituent));
                    continue;
                };
                records[pos].harmonics.terms.push(HarmonicTerm {
                    constituent: constituent.name().to_string(),
                    amplitude: harm.amplitude,
                    phase: normalize_degrees(harm.phase),
                });
            }
            Row::Sub(sub) => {
                let (Some(&pos), Some(&reference_pos)) = (by_index.get(&sub.index), by_index.get(&sub.reference)) else {
                    warn_malformed(
                        source_name,
                        *line_no,
                        format!("unknown station index in {} -> {}", sub.index, sub.reference),
                    );
                    continue;
                };
                if pos == reference_pos {
                    warn_malformed(source_name, *line_no, "station references itself");
                    continue;
                }
                let reference = records[reference_pos].metadata.lookup_key().to_string();
                records[pos].harmonics.kind = StationKind::Subordinate(SubordinateOffsets {
                    reference,
                    high_offset_seconds: (sub.high_offset_minutes * 60.0).round() as i64,
                    high_multiplier: sub.high_multiplier,
                    low_offset_seconds: (sub.low_offset_minutes * 60.0).round() as i64,
                    low_multiplier: sub.low_multiplier,
                });
            }
            _ => {}
        }
    }

    records
}

fn warn_malformed(source_name: &str, line: usize, reason: impl Into<String>) {
    let err = TideError::malformed(source_name, line, reason);
    warn!("{err}, skipping");
}

fn parse_row(line: &str, catalog: &ConstituentCatalog) -> Result<Row, String> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    match fields[0].to_ascii_uppercase().as_str() {
        "CONST" => parse_const(&fields, catalog).map(Row::Const),
        "STATION" => parse_station(&fields).map(Row::Station),
        "HARM" => parse_harm(&fields).map(Row::Harm),
        "SUB" => parse_sub(&fields).map(Row::Sub),
        other => Err(format!("unknown record tag {other:?}")),
    }
}

fn expect_fields(fields: &[&str], count: usize) -> Result<(), String> {
    if fields.len() == count {
        Ok(())
    } else {
        Err(format!("{} record needs {count} fields, got {}", fields[0], fields.len()))
    }
}

fn number(raw: &str, what: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid {what}: {raw:?}"))
}

fn parse_const(fields: &[&str], catalog: &ConstituentCatalog) -> Result<Constituent, String> {
    if fields.len() < 5 {
        return Err("CONST record needs at least 5 fields".into());
    }
    let name = fields[1];
    if name.is_empty() {
        return Err("empty constituent name".into());
    }
    match fields[3].to_ascii_lowercase().as_str() {
        "basic" => {
            expect_fields(fields, 7)?;
            let arguments = parse_vector::<6>(fields[4], "argument")?;
            let corrections = parse_vector::<7>(fields[5], "correction")?;
            let formula = NodeFactorFormula::parse(fields[6])
                .ok_or_else(|| format!("unknown node factor formula {:?}", fields[6]))?;
            let arguments = arguments.map(|v| v.round() as i32);
            let speed = if fields[2].is_empty() {
                BasicConstituent::argument_speed(&arguments)
            } else {
                number(fields[2], "speed")?
            };
            Ok(Constituent::Basic(BasicConstituent {
                name: name.to_string(),
                speed,
                arguments,
                corrections,
                formula,
            }))
        }
        "compound" => {
            expect_fields(fields, 5)?;
            let mut weights = [0.0; BASE_COUNT];
            for pair in fields[4].split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (base, weight) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected base=weight, got {pair:?}"))?;
                let slot = BASE_CONSTITUENTS
                    .iter()
                    .position(|b| b.eq_ignore_ascii_case(base.trim()))
                    .ok_or_else(|| format!("{base:?} is not a base constituent"))?;
                weights[slot] += number(weight.trim(), "weight")?;
            }
            let speed = if fields[2].is_empty() {
                compound_speed(&weights, catalog)
            } else {
                number(fields[2], "speed")?
            };
            Ok(Constituent::Compound(CompoundConstituent {
                name: name.to_string(),
                speed,
                weights,
            }))
        }
        other => Err(format!("unknown constituent kind {other:?}")),
    }
}

fn parse_vector<const N: usize>(raw: &str, what: &str) -> Result<[f64; N], String> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|v| number(v.trim(), what))
        .collect::<Result<_, _>>()?;
    <[f64; N]>::try_from(values.as_slice())
        .map_err(|_| format!("{what} vector needs {N} values, got {}", values.len()))
}

fn parse_station(fields: &[&str]) -> Result<StationRow, String> {
    expect_fields(fields, 11)?;
    let latitude = number(fields[3], "latitude")?;
    let longitude = number(fields[4], "longitude")?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("coordinates out of range: {latitude}, {longitude}"));
    }
    let units = Units::parse(fields[6]).ok_or_else(|| format!("unknown units {:?}", fields[6]))?;
    let depth = if fields[10].is_empty() {
        None
    } else {
        Some(number(fields[10], "depth")?)
    };
    Ok(StationRow {
        index: fields[1].to_string(),
        name: fields[2].to_string(),
        latitude,
        longitude,
        timezone: fields[5].to_string(),
        units,
        datum_offset: number(fields[7], "datum offset")?,
        meridian_minutes: parse_meridian(fields[8])
            .ok_or_else(|| format!("invalid meridian {:?}", fields[8]))?,
        region: (!fields[9].is_empty()).then(|| fields[9].to_string()),
        depth,
    })
}

fn parse_harm(fields: &[&str]) -> Result<HarmRow, String> {
    expect_fields(fields, 5)?;
    let amplitude = number(fields[3], "amplitude")?;
    if amplitude < 0.0 {
        return Err(format!("negative amplitude {amplitude}"));
    }
    Ok(HarmRow {
        index: fields[1].to_string(),
        constituent: fields[2].to_string(),
        amplitude,
        phase: number(fields[4], "phase")?,
    })
}

fn parse_sub(fields: &[&str]) -> Result<SubRow, String> {
    expect_fields(fields, 7)?;
    Ok(SubRow {
        index: fields[1].to_string(),
        reference: fields[2].to_string(),
        high_offset_minutes: offset_minutes(fields[3], "high offset")?,
        high_multiplier: number(fields[4], "high multiplier")?,
        low_offset_minutes: offset_minutes(fields[5], "low offset")?,
        low_multiplier: number(fields[6], "low multiplier")?,
    })
}

fn offset_minutes(raw: &str, what: &str) -> Result<f64, String> {
    let minutes = number(raw, what)?;
    if minutes.abs() > MAX_OFFSET_MINUTES {
        return Err(format!("{what} {minutes} min exceeds one day"));
    }
    Ok(minutes)
}

/// Build a record with a unique lookup key, disambiguating collisions in file order.
fn station_record(
    row: &StationRow,
    provider: Provider,
    given_id: Option<&str>,
    taken_keys: &mut HashSet<String>,
) -> StationRecord {
    let prefix = match provider {
        Provider::HarmonicDatabase => PRIMARY_PREFIX,
        Provider::GlobalModel => SECONDARY_PREFIX,
    };
    let base = match given_id {
        Some(id) if !id.trim().is_empty() => format!("{prefix}:{}", id.trim()),
        _ => coordinate_id(prefix, row.latitude, row.longitude),
    };

    let mut id = base.clone();
    let mut n = 1;
    loop {
        let key = match row.depth {
            Some(depth) => bin_id(&id, depth),
            None => id.clone(),
        };
        if taken_keys.insert(key) {
            break;
        }
        n += 1;
        id = format!("{base}#{n}");
    }

    StationRecord {
        metadata: StationMetadata {
            name: row.name.clone(),
            bin_id: row.depth.map(|depth| bin_id(&id, depth)),
            id,
            latitude: row.latitude,
            longitude: row.longitude,
            region: row.region.clone(),
            provider,
            depth: row.depth,
        },
        harmonics: StationHarmonics {
            terms: Vec::new(),
            datum_offset: row.datum_offset,
            meridian_minutes: row.meridian_minutes,
            timezone: row.timezone.clone(),
            units: row.units,
            kind: StationKind::Reference,
        },
    }
}

// -- Secondary global-model dataset --

#[derive(Debug, Deserialize)]
struct GlobalStation {
    #[serde(default)]
    id: String,
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default = "default_timezone")]
    timezone: String,
    units: String,
    constituents: Vec<GlobalConstituent>,
    #[serde(default)]
    datum_offset: f64,
    #[serde(default)]
    meridian: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    depth: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GlobalConstituent {
    name: String,
    phase: f64,
    amp: f64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Parse the JSON global-model dataset.
///
/// Each array element is decoded on its own; malformed elements are skipped. The
/// "line" reported for a malformed element is its 1-based array position. Only a
/// document that is not a JSON array is an error.
pub fn parse_secondary(
    text: &str,
    source_name: &str,
    catalog: &ConstituentCatalog,
) -> Result<Vec<StationRecord>, TideError> {
    let elements: Vec<serde_json::Value> = serde_json::from_str(text)?;
    let mut records = Vec::with_capacity(elements.len());
    let mut taken_keys = HashSet::new();

    for (i, element) in elements.into_iter().enumerate() {
        let position = i + 1;
        let station: GlobalStation = match serde_json::from_value(element) {
            Ok(station) => station,
            Err(e) => {
                warn_malformed(source_name, position, e.to_string());
                continue;
            }
        };
        match global_record(&station, catalog, source_name, position, &mut taken_keys) {
            Ok(record) => records.push(record),
            Err(reason) => warn_malformed(source_name, position, reason),
        }
    }
    Ok(records)
}

fn global_record(
    station: &GlobalStation,
    catalog: &ConstituentCatalog,
    source_name: &str,
    position: usize,
    taken_keys: &mut HashSet<String>,
) -> Result<StationRecord, String> {
    if !(-90.0..=90.0).contains(&station.lat) || !(-180.0..=180.0).contains(&station.lon) {
        return Err(format!("coordinates out of range: {}, {}", station.lat, station.lon));
    }
    let units = Units::parse(&station.units).ok_or_else(|| format!("unknown units {:?}", station.units))?;
    let meridian_minutes = match &station.meridian {
        Some(raw) => parse_meridian(raw).ok_or_else(|| format!("invalid meridian {raw:?}"))?,
        None => 0,
    };
    if let Some(bad) = station.constituents.iter().find(|c| c.amp < 0.0 || !c.amp.is_finite()) {
        return Err(format!("invalid amplitude {} for {}", bad.amp, bad.name));
    }

    let row = StationRow {
        index: station.id.clone(),
        name: station.name.clone(),
        latitude: station.lat,
        longitude: station.lon,
        timezone: station.timezone.clone(),
        units,
        datum_offset: station.datum_offset,
        meridian_minutes,
        region: station.region.clone(),
        depth: station.depth,
    };
    let mut record = station_record(&row, Provider::GlobalModel, Some(row.index.as_str()), taken_keys);

    for c in &station.constituents {
        match catalog.resolve(&c.name) {
            Some(constituent) => record.harmonics.terms.push(HarmonicTerm {
                constituent: constituent.name().to_string(),
                amplitude: c.amp,
                phase: normalize_degrees(c.phase),
            }),
            None => warn_malformed(source_name, position, format!("unknown constituent {}", c.name)),
        }
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARY: &str = "\
# constituent extensions
CONST|MSN6||compound|M2=1,S2=1,N2=1
CONST|SO1|16.0569644|basic|1,2,-1,0,0,-1|0,-1,0,0,0,0,0|J1
STATION|7|Seattle, WA|47.6026|-122.3393|America/Los_Angeles|ft|6.57|+08:00|Puget Sound|
HARM|7|M2|3.515|138.7
HARM|7|s2|0.86|160.1
HARM|7|MSN6|0.01|12
HARM|7|Z0|1.0|0
STATION|8|Tacoma|47.2690|-122.4130|America/Los_Angeles|feet|6.3|+08:00||
SUB|8|7|12|1.05|-6.5|0.98
STATION|9|Rosario Strait|48.4600|-122.7500|America/Los_Angeles|knots|0|+08:00||4.5
STATION|10|Rosario Strait|48.4600|-122.7500|America/Los_Angeles|knots|0|+08:00||12
HARM|9|M2|1.8|99.0
HARM|10|M2|1.2|101.0
HARM|11|M2|1.0|0
STATION|12|Broken|north|-122|UTC|ft|0|0||
HARM|7|K1|-1|0
BOGUS|1|2
";

    #[test]
    fn primary_rows_become_records() {
        let mut catalog = ConstituentCatalog::builtin();
        let records = parse_primary(PRIMARY, "test.tdb", &mut catalog);
        assert_eq!(records.len(), 4);

        // File constituents extend the catalog
        assert!(catalog.contains("MSN6"));
        assert!(catalog.contains("SO1"));
        let msn6 = catalog.get("MSN6").unwrap().speed();
        assert!((msn6 - (28.984_104_2 + 30.0 + 28.439_729_5)).abs() < 1e-6);

        let seattle = &records[0];
        assert_eq!(seattle.metadata.id, "harm:47.6026,-122.3393");
        assert_eq!(seattle.metadata.region.as_deref(), Some("Puget Sound"));
        assert_eq!(seattle.harmonics.meridian_minutes, 480);
        assert_eq!(seattle.harmonics.units, Units::Feet);
        // Z0 unknown, negative K1 amplitude malformed; s2 resolved case-insensitively
        let names: Vec<_> = seattle.harmonics.terms.iter().map(|t| t.constituent.as_str()).collect();
        assert_eq!(names, ["M2", "S2", "MSN6"]);
    }

    #[test]
    fn subordinate_rows_reference_lookup_keys() {
        let mut catalog = ConstituentCatalog::builtin();
        let records = parse_primary(PRIMARY, "test.tdb", &mut catalog);
        let tacoma = &records[1];
        let offsets = tacoma.harmonics.subordinate().expect("Tacoma is subordinate");
        assert_eq!(offsets.reference, "harm:47.6026,-122.3393");
        assert_eq!(offsets.high_offset_seconds, 720);
        assert_eq!(offsets.low_offset_seconds, -390);
        assert!((offsets.high_multiplier - 1.05).abs() < 1e-12);
    }

    #[test]
    fn current_bins_get_depth_qualified_ids() {
        let mut catalog = ConstituentCatalog::builtin();
        let records = parse_primary(PRIMARY, "test.tdb", &mut catalog);
        let shallow = &records[2];
        let deep = &records[3];
        assert_eq!(shallow.metadata.id, deep.metadata.id);
        assert_eq!(shallow.metadata.bin_id.as_deref(), Some("harm:48.4600,-122.7500@4.5m"));
        assert_eq!(deep.metadata.bin_id.as_deref(), Some("harm:48.4600,-122.7500@12.0m"));
        assert_eq!(shallow.harmonics.terms.len(), 1);
        assert_eq!(deep.harmonics.terms[0].amplitude, 1.2);
    }

    #[test]
    fn ids_are_stable_across_reingestion() {
        let mut c1 = ConstituentCatalog::builtin();
        let mut c2 = ConstituentCatalog::builtin();
        let a = parse_primary(PRIMARY, "a", &mut c1);
        let b = parse_primary(PRIMARY, "b", &mut c2);
        let ids_a: Vec<_> = a.iter().map(|r| r.metadata.lookup_key().to_string()).collect();
        let ids_b: Vec<_> = b.iter().map(|r| r.metadata.lookup_key().to_string()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn colliding_coordinates_are_disambiguated() {
        let text = "\
STATION|1|Pier A|10.0|20.0|UTC|m|0|0||
STATION|2|Pier B|10.00001|20.0|UTC|m|0|0||
";
        let mut catalog = ConstituentCatalog::builtin();
        let records = parse_primary(text, "t", &mut catalog);
        assert_eq!(records[0].metadata.id, "harm:10.0000,20.0000");
        assert_eq!(records[1].metadata.id, "harm:10.0000,20.0000#2");
    }

    #[test]
    fn secondary_json_is_parsed_per_element() {
        let text = r#"[
            {"id": "ticon-001", "name": "Seattle", "lat": 47.6026, "lon": -122.3393,
             "timezone": "America/Los_Angeles", "units": "meters",
             "constituents": [{"name": "M2", "phase": 498.7, "amp": 1.0714},
                              {"name": "Q9", "phase": 1.0, "amp": 0.1}],
             "datum_offset": 2.0, "meridian": "+08:00"},
            {"id": "ticon-002", "name": "Nowhere", "lat": "bad"},
            {"id": "", "name": "Unnamed", "lat": -33.86, "lon": 151.21, "units": "m",
             "constituents": [], "datum_offset": 0.9},
            {"id": "ticon-003", "name": "Negative", "lat": 0.0, "lon": 0.0, "units": "m",
             "constituents": [{"name": "M2", "phase": 0, "amp": -1.0}]}
        ]"#;
        let catalog = ConstituentCatalog::builtin();
        let records = parse_secondary(text, "global.json", &catalog).unwrap();
        assert_eq!(records.len(), 2);

        let seattle = &records[0];
        assert_eq!(seattle.metadata.id, "glob:ticon-001");
        assert_eq!(seattle.metadata.provider, Provider::GlobalModel);
        assert_eq!(seattle.harmonics.terms.len(), 1);
        assert!((seattle.harmonics.terms[0].phase - 138.7).abs() < 1e-9);
        assert_eq!(seattle.harmonics.meridian_minutes, 480);

        let unnamed = &records[1];
        assert_eq!(unnamed.metadata.id, "glob:-33.8600,151.2100");
        assert_eq!(unnamed.harmonics.timezone, "UTC");
    }

    #[test]
    fn secondary_non_array_is_an_error() {
        let catalog = ConstituentCatalog::builtin();
        assert!(matches!(
            parse_secondary("{\"stations\": []}", "g", &catalog),
            Err(TideError::Json(_))
        ));
    }

    #[test]
    fn meridian_formats() {
        assert_eq!(parse_meridian("+05:00"), Some(300));
        assert_eq!(parse_meridian("-03:30"), Some(-210));
        assert_eq!(parse_meridian("-0:30"), Some(-30));
        assert_eq!(parse_meridian("8"), Some(480));
        assert_eq!(parse_meridian("5.5"), Some(330));
        assert_eq!(parse_meridian(""), Some(0));
        assert_eq!(parse_meridian("05:75"), None);
        assert_eq!(parse_meridian("east"), None);
        assert_eq!(parse_meridian("-24:00"), Some(-1440));
        assert_eq!(parse_meridian("24:01"), None);
        assert_eq!(parse_meridian("99999999:00"), None);
        assert_eq!(parse_meridian("1e12"), None);
        assert_eq!(parse_meridian("NaN"), None);
    }

    #[test]
    fn out_of_range_rows_are_skipped() {
        let text = "\
STATION|1|Far East|10.0|20.0|UTC|m|0|99999999:00||
HARM|1|M2|1.0|0
STATION|2|Anchor|11.0|21.0|UTC|m|0|+00:00||
HARM|2|M2|1.0|0
STATION|3|Drifter|12.0|22.0|UTC|m|0|+00:00||
SUB|3|2|1e300|1.0|0|1.0
STATION|4|Late Cove|13.0|23.0|UTC|m|0|+00:00||
SUB|4|2|-1441|1.0|0|1.0
STATION|5|Near Cove|14.0|24.0|UTC|m|0|+00:00||
SUB|5|2|1440|1.0|-90|1.0
";
        let mut catalog = ConstituentCatalog::builtin();
        let records = parse_primary(text, "t", &mut catalog);
        let names: Vec<_> = records.iter().map(|r| r.metadata.name.as_str()).collect();
        assert_eq!(names, ["Anchor", "Drifter", "Late Cove", "Near Cove"]);
        // Rejected SUB rows leave the station without offsets
        assert!(!records[1].harmonics.is_subordinate());
        assert!(!records[2].harmonics.is_subordinate());
        let offsets = records[3].harmonics.subordinate().unwrap();
        assert_eq!(offsets.high_offset_seconds, 86_400);
        assert_eq!(offsets.low_offset_seconds, -5_400);
    }
}
