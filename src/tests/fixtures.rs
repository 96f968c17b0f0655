//! Fixture sources shared by the scenario tests.

use crate::config::EngineConfig;
use std::fs;
use std::path::Path;

/// M2/S2 station on a +05:00 meridian.
pub(crate) const SCENARIO_ID: &str = "harm:10.0000,72.0000";
/// Subordinate of the scenario station with zero offsets and unit multipliers.
pub(crate) const IDENTITY_SUB_ID: &str = "harm:10.0100,72.0100";
/// Subordinate with +45/−30 minute offsets and negative multipliers.
pub(crate) const MIRROR_SUB_ID: &str = "harm:10.0200,72.0200";
/// Tidal-current reference station observed at 10 m.
pub(crate) const CURRENT_ID: &str = "harm:48.3000,-123.5000@10.0m";
/// Subordinate of the current station.
pub(crate) const CURRENT_SUB_ID: &str = "harm:48.3100,-123.5300";
/// Station whose only constituent is unknown.
pub(crate) const EMPTY_ID: &str = "harm:0.5000,0.5000";
pub(crate) const PORTLAND_PRIMARY_ID: &str = "harm:43.6567,-70.2467";
pub(crate) const PORTLAND_GLOBAL_ID: &str = "glob:portland-me";

pub(crate) const PRIMARY_FIXTURE: &str = "\
# Fixture harmonic database
STATION|1|Scenario Point|10.0|72.0|Indian/Maldives|m|0|+05:00|Test|
HARM|1|M2|4.25|112.3
HARM|1|S2|0.72|145.6
STATION|2|Identity Cove|10.01|72.01|Indian/Maldives|m|0|+05:00|Test|
SUB|2|1|0|1.0|0|1.0
STATION|3|Mirror Inlet|10.02|72.02|Indian/Maldives|m|0|+05:00|Test|
SUB|3|1|45|-1.0|-30|-0.5
STATION|4|Portland, ME|43.6567|-70.2467|America/New_York|ft|5.1|+05:00|Gulf of Maine|
HARM|4|M2|4.5|100.0
HARM|4|S2|0.7|130.0
HARM|4|N2|0.95|75.0
STATION|5|Race Passage|48.3|-123.5|America/Vancouver|knots|0.3|+08:00|Juan de Fuca|10
HARM|5|M2|3.1|40.0
HARM|5|K1|1.2|210.0
STATION|6|Race Rocks Light|48.31|-123.53|America/Vancouver|knots|0|+08:00|Juan de Fuca|
SUB|6|5|20|0.8|-15|0.9
STATION|7|Empty Shoal|0.5|0.5|UTC|m|0|+00:00||
HARM|7|Q9|1.0|0
STATION|8|Broken Row|abc|0|UTC|m|0|0||
";

pub(crate) const SECONDARY_FIXTURE: &str = r#"[
  {"id": "portland-me", "name": "PORTLAND ME", "lat": 43.66, "lon": -70.25,
   "timezone": "America/New_York", "units": "m",
   "constituents": [{"name": "M2", "phase": 100.0, "amp": 1.3716},
                    {"name": "S2", "phase": 130.0, "amp": 0.21336},
                    {"name": "N2", "phase": 75.0, "amp": 0.28956}],
   "datum_offset": 1.554, "meridian": "+05:00"},
  {"id": "cape-town", "name": "Cape Town", "lat": -33.9, "lon": 18.43,
   "timezone": "Africa/Johannesburg", "units": "m",
   "constituents": [{"name": "M2", "phase": 48.0, "amp": 0.5},
                    {"name": "K1", "phase": 160.0, "amp": 0.05}],
   "datum_offset": 0.9},
  {"id": "broken", "name": "Broken"}
]"#;

/// Write both sources into `dir` and return a configuration caching under `dir/cache`.
pub(crate) fn write_sources(dir: &Path, primary: &str, secondary: &str) -> EngineConfig {
    let primary_path = dir.join("harmonics.tdb");
    let secondary_path = dir.join("global_stations.json");
    fs::write(&primary_path, primary).unwrap();
    fs::write(&secondary_path, secondary).unwrap();

    let mut config = EngineConfig::with_sources(primary_path, secondary_path);
    config.cache.dir = Some(dir.join("cache"));
    config.cache.enabled = true;
    config
}
