//! # Nodal Factors
//!
//! Per-constituent corrections for the 18.6-year regression of the lunar node:
//!
//! - **f**: multiplicative amplitude factor
//! - **u**: additive phase correction (degrees)
//! - **V0**: equilibrium argument at the start of the local year (degrees)
//!
//! V0 is evaluated at the year-start instant; f and u at a representative local-noon
//! instant of one calendar day. One [`NodalFactorSet`] therefore serves every sample
//! within a UTC day, and prediction scans recompute once per day crossed rather than
//! per sample. Sets are cached in memory by [`NodalTable`] and optionally on disk.
//!
//! ## Orbital angles
//!
//! The inclination I of the lunar orbit to the equator follows from the spherical
//! law of cosines on the obliquity ω, the lunar-orbit inclination i and the node N.
//! The remaining angles (ξ, ν, ν′, 2ν″, Q, Qu, R) and the amplitude ratios 1/Qa and
//! 1/Ra are closed-form functions of I, ν and the lunar perigee.

use crate::astro::{self, dms, fundamental_arguments, normalize_degrees, signed_degrees, AstronomicalArguments};
use crate::cache::DiskCache;
use crate::constituents::{Constituent, ConstituentCatalog, NodeFactorFormula, BASE_CONSTITUENTS};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Obliquity of the ecliptic (ω).
pub fn obliquity() -> f64 {
    dms(23.0, 27.0, 8.26)
}

/// Inclination of the moon's orbit to the ecliptic (i).
pub fn lunar_inclination() -> f64 {
    dms(5.0, 8.0, 43.3546)
}

/// Node-dependent angles of the lunar orbit, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalAngles {
    /// Inclination of the lunar orbit to the equator (I)
    pub inclination: f64,
    /// Longitude in the moon's orbit of the lunar intersection (ξ)
    pub xi: f64,
    /// Right ascension of the lunar intersection (ν)
    pub nu: f64,
    /// Lunisolar term for K1 (ν′)
    pub nu_prime: f64,
    /// Lunisolar term for K2 (2ν″)
    pub two_nu_pp: f64,
    /// Schureman Q, quadrant-matched to P = p − ξ
    pub q: f64,
    /// M1 phase correction, Q − P
    pub q_u: f64,
    /// L2 phase correction (R)
    pub r: f64,
    /// M1 amplitude ratio 1/Qa
    pub qa_inv: f64,
    /// L2 amplitude ratio 1/Ra
    pub ra_inv: f64,
}

impl OrbitalAngles {
    pub fn from_arguments(args: &AstronomicalArguments) -> Self {
        let omega = obliquity().to_radians();
        let i = lunar_inclination().to_radians();
        let n = args.lunar_node.to_radians();

        let cos_incl = omega.cos() * i.cos() - omega.sin() * i.sin() * n.cos();
        let incl = cos_incl.clamp(-1.0, 1.0).acos();

        // Napier's analogies for the spherical triangle (ω, i, N)
        let tan_half_n = (0.5 * n).tan();
        let e1 = ((0.5 * (omega - i)).cos() / (0.5 * (omega + i)).cos() * tan_half_n).atan() - 0.5 * n;
        let e2 = ((0.5 * (omega - i)).sin() / (0.5 * (omega + i)).sin() * tan_half_n).atan() - 0.5 * n;
        let xi = -(e1 + e2);
        let nu = e1 - e2;

        let sin_2i = (2.0 * incl).sin();
        let nu_prime = (sin_2i * nu.sin()).atan2(sin_2i * nu.cos() + 0.3347);

        let sin2_i = incl.sin().powi(2);
        let two_nu_pp = (sin2_i * (2.0 * nu).sin()).atan2(sin2_i * (2.0 * nu).cos() + 0.0727);

        let perigee = (args.lunar_perigee - xi.to_degrees()).to_radians();
        let q = ((5.0 * incl.cos() - 1.0) * perigee.sin()).atan2((7.0 * incl.cos() + 1.0) * perigee.cos());
        let q_u = signed_degrees(q.to_degrees() - perigee.to_degrees());

        let half = 0.5 * incl;
        let tan2_half = half.tan().powi(2);
        let cos2_half = half.cos().powi(2);
        let cos_2p = (2.0 * perigee).cos();

        let r = (2.0 * perigee).sin().atan2(1.0 / (6.0 * tan2_half) - cos_2p);

        let qa_inv = (0.25 + 1.5 * incl.cos() * cos_2p / cos2_half
            + 2.25 * incl.cos().powi(2) / cos2_half.powi(2))
        .max(0.0)
        .sqrt();
        let ra_inv = (1.0 - 12.0 * tan2_half * cos_2p + 36.0 * tan2_half.powi(2))
            .max(0.0)
            .sqrt();

        OrbitalAngles {
            inclination: incl.to_degrees(),
            xi: signed_degrees(xi.to_degrees()),
            nu: signed_degrees(nu.to_degrees()),
            nu_prime: signed_degrees(nu_prime.to_degrees()),
            two_nu_pp: signed_degrees(two_nu_pp.to_degrees()),
            q: normalize_degrees(q.to_degrees()),
            q_u,
            r: signed_degrees(r.to_degrees()),
            qa_inv,
            ra_inv,
        }
    }

    /// Angles in correction-coefficient order: ξ, ν, ν′, 2ν″, Q, Qu, R.
    pub fn as_correction_vector(&self) -> [f64; 7] {
        [
            self.xi,
            self.nu,
            self.nu_prime,
            self.two_nu_pp,
            self.q,
            self.q_u,
            self.r,
        ]
    }
}

/// Evaluate a node-factor formula.
pub fn node_factor(formula: NodeFactorFormula, angles: &OrbitalAngles) -> f64 {
    let incl = angles.inclination.to_radians();
    let nu = angles.nu.to_radians();
    let sin_i = incl.sin();
    let sin_half = (0.5 * incl).sin();
    let cos_half = (0.5 * incl).cos();

    match formula {
        NodeFactorFormula::Unity => 1.0,
        NodeFactorFormula::F73 => (2.0 / 3.0 - sin_i.powi(2)) / 0.5021,
        NodeFactorFormula::F74 => sin_i.powi(2) / 0.1578,
        NodeFactorFormula::F75 => sin_i * cos_half.powi(2) / 0.3800,
        NodeFactorFormula::F76 => (2.0 * incl).sin() / 0.7214,
        NodeFactorFormula::F77 => sin_i * sin_half.powi(2) / 0.0164,
        NodeFactorFormula::F78 => cos_half.powi(4) / 0.9154,
        NodeFactorFormula::F144 => {
            (1.0 - 10.0 * sin_half.powi(2) + 15.0 * sin_half.powi(4)) * cos_half.powi(2) / 0.5873
        }
        NodeFactorFormula::F149 => cos_half.powi(6) / 0.8758,
        NodeFactorFormula::F206 => node_factor(NodeFactorFormula::F75, angles) * angles.qa_inv,
        NodeFactorFormula::F215 => node_factor(NodeFactorFormula::F78, angles) * angles.ra_inv,
        NodeFactorFormula::F227 => (0.8965 * (2.0 * incl).sin().powi(2)
            + 0.6001 * (2.0 * incl).sin() * nu.cos()
            + 0.1006)
            .sqrt(),
        NodeFactorFormula::F235 => (19.0444 * sin_i.powi(4)
            + 2.7702 * sin_i.powi(2) * (2.0 * nu).cos()
            + 0.0981)
            .sqrt(),
    }
}

/// Corrections for one constituent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodalFactor {
    pub f: f64,
    /// Degrees, (-180, 180]
    pub u: f64,
    /// Degrees, [0, 360)
    pub v0: f64,
}

impl NodalFactor {
    pub const IDENTITY: NodalFactor = NodalFactor {
        f: 1.0,
        u: 0.0,
        v0: 0.0,
    };
}

/// Identifies one nodal-factor table.
///
/// `year` is the local year whose start anchors V0; `day` is the UTC calendar day
/// whose local noon (at `reference_hour`) anchors f and u.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodalKey {
    pub year: i32,
    pub day: NaiveDate,
    /// Local standard time = UTC − this offset
    pub meridian_minutes: i32,
    pub reference_hour: u32,
}

impl NodalKey {
    pub const REFERENCE_HOUR: u32 = 12;

    /// Key for a sample instant at a station whose phases use `meridian_minutes`.
    pub fn for_instant(instant: DateTime<Utc>, meridian_minutes: i32) -> Self {
        let local = instant - Duration::minutes(meridian_minutes as i64);
        NodalKey {
            year: local.year(),
            day: instant.date_naive(),
            meridian_minutes,
            reference_hour: Self::REFERENCE_HOUR,
        }
    }

    /// Local midnight opening `year`, as a UTC instant.
    pub fn year_start(&self) -> DateTime<Utc> {
        let jan1 = NaiveDate::from_yo_opt(self.year, 1).unwrap_or(self.day);
        local_to_utc(jan1, 0, self.meridian_minutes)
    }

    /// Local `reference_hour` on `day`, as a UTC instant.
    pub fn representative_instant(&self) -> DateTime<Utc> {
        local_to_utc(self.day, self.reference_hour.min(23), self.meridian_minutes)
    }

    /// Stable file-name fragment for on-disk persistence.
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}_{:02}",
            self.year,
            self.day.format("%Y%m%d"),
            self.meridian_minutes,
            self.reference_hour
        )
    }
}

fn local_to_utc(day: NaiveDate, hour: u32, meridian_minutes: i32) -> DateTime<Utc> {
    day.and_time(NaiveTime::default()).and_utc()
        + Duration::hours(hour as i64)
        + Duration::minutes(meridian_minutes as i64)
}

/// Hours elapsed since the local year start of `key`.
pub fn hours_since_year_start(instant: DateTime<Utc>, key: &NodalKey) -> f64 {
    let elapsed = instant - key.year_start();
    elapsed.num_milliseconds() as f64 / 3_600_000.0
}

/// Factors for every catalog constituent under one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodalFactorSet {
    pub key: NodalKey,
    pub factors: HashMap<String, NodalFactor>,
}

impl NodalFactorSet {
    pub fn get(&self, constituent: &str) -> Option<&NodalFactor> {
        self.factors.get(constituent)
    }
}

/// Σ coefficient × angle over (T, s, h, p, p₁) plus the 90° multiple.
pub fn equilibrium_argument(arguments: &[i32; 6], args: &AstronomicalArguments) -> f64 {
    let angles = args.as_argument_vector();
    let sum: f64 = arguments[..5]
        .iter()
        .zip(angles.iter())
        .map(|(&c, &angle)| c as f64 * angle)
        .sum();
    normalize_degrees(sum + arguments[5] as f64 * 90.0)
}

/// Σ coefficient × orbital angle over (ξ, ν, ν′, 2ν″, Q, Qu, R).
pub fn phase_correction(corrections: &[f64; 7], angles: &OrbitalAngles) -> f64 {
    let values = angles.as_correction_vector();
    let sum: f64 = corrections
        .iter()
        .zip(values.iter())
        .map(|(c, angle)| c * angle)
        .sum();
    signed_degrees(sum)
}

/// Combine base-constituent factors by signed weights.
///
/// f multiplies the base f-values raised to |weight|; u and V0 add up the base
/// values scaled by the signed weight. Missing bases contribute the identity.
pub fn combine_compound(weights: &[f64], bases: &HashMap<String, NodalFactor>) -> NodalFactor {
    let mut f = 1.0;
    let mut u = 0.0;
    let mut v0 = 0.0;
    for (base, &weight) in BASE_CONSTITUENTS.iter().zip(weights.iter()) {
        if weight == 0.0 {
            continue;
        }
        let factor = bases.get(*base).copied().unwrap_or(NodalFactor::IDENTITY);
        f *= factor.f.powf(weight.abs());
        u += weight * factor.u;
        v0 += weight * factor.v0;
    }
    NodalFactor {
        f,
        u: signed_degrees(u),
        v0: normalize_degrees(v0),
    }
}

/// Compute the factors of every constituent in `catalog` for `key`.
pub fn compute_nodal_factors(catalog: &ConstituentCatalog, key: &NodalKey) -> NodalFactorSet {
    let start_args = fundamental_arguments(key.year_start());
    let day_args = fundamental_arguments(key.representative_instant());
    let angles = OrbitalAngles::from_arguments(&day_args);

    let mut factors = HashMap::with_capacity(catalog.len());
    for constituent in catalog.iter() {
        let factor = match constituent {
            Constituent::Basic(basic) => NodalFactor {
                f: node_factor(basic.formula, &angles),
                u: phase_correction(&basic.corrections, &angles),
                v0: equilibrium_argument(&basic.arguments, &start_args),
            },
            Constituent::Compound(compound) => combine_compound(&compound.weights, &factors),
        };
        factors.insert(constituent.name().to_string(), factor);
    }

    debug!(
        year = key.year,
        day = %key.day,
        meridian = key.meridian_minutes,
        centuries = astro::julian_centuries(key.representative_instant()),
        "computed nodal factors"
    );
    NodalFactorSet { key: *key, factors }
}

/// In-memory nodal-factor tables, never purged.
///
/// Concurrent misses may compute the same key twice; the first stored value wins and
/// both callers see a complete set.
#[derive(Debug, Default)]
pub struct NodalTable {
    entries: RwLock<HashMap<NodalKey, Arc<NodalFactorSet>>>,
}

impl NodalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &NodalKey) -> Option<Arc<NodalFactorSet>> {
        self.entries.read().get(key).cloned()
    }

    /// Publish a computed set, returning whichever set is stored for its key.
    pub fn insert(&self, set: NodalFactorSet) -> Arc<NodalFactorSet> {
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(set.key).or_insert_with(|| Arc::new(set)))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Nodal-factor lookup: memory table, then disk, then computation.
#[derive(Clone, Copy)]
pub struct NodalFactors<'a> {
    catalog: &'a ConstituentCatalog,
    table: &'a NodalTable,
    disk: Option<(&'a DiskCache, &'a str)>,
}

impl<'a> NodalFactors<'a> {
    pub fn new(catalog: &'a ConstituentCatalog, table: &'a NodalTable) -> Self {
        NodalFactors {
            catalog,
            table,
            disk: None,
        }
    }

    /// Persist computed sets under `fingerprint` in `cache`.
    pub fn with_disk(mut self, cache: &'a DiskCache, fingerprint: &'a str) -> Self {
        self.disk = Some((cache, fingerprint));
        self
    }

    pub fn catalog(&self) -> &'a ConstituentCatalog {
        self.catalog
    }

    pub fn get(&self, key: &NodalKey) -> Arc<NodalFactorSet> {
        if let Some(set) = self.table.get(key) {
            return set;
        }

        if let Some((disk, fingerprint)) = self.disk {
            if let Some(set) = disk.load_nodal(fingerprint, key) {
                return self.table.insert(set);
            }
        }

        let set = compute_nodal_factors(self.catalog, key);
        if let Some((disk, fingerprint)) = self.disk {
            if let Err(e) = disk.store_nodal(fingerprint, &set) {
                warn!(error = %e, key = %key.file_stem(), "failed to persist nodal factors");
            }
        }
        self.table.insert(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constituents::BASE_COUNT;
    use chrono::TimeZone;

    fn key_2024() -> NodalKey {
        NodalKey::for_instant(Utc.with_ymd_and_hms(2024, 3, 15, 6, 0, 0).unwrap(), 0)
    }

    #[test]
    fn zero_weight_compound_is_identity() {
        let catalog = ConstituentCatalog::builtin();
        let set = compute_nodal_factors(&catalog, &key_2024());
        let factor = combine_compound(&[0.0; BASE_COUNT], &set.factors);
        assert_eq!(factor, NodalFactor::IDENTITY);
    }

    #[test]
    fn compound_factors_follow_bases() {
        let catalog = ConstituentCatalog::builtin();
        let set = compute_nodal_factors(&catalog, &key_2024());
        let m2 = set.get("M2").unwrap();
        let s2 = set.get("S2").unwrap();
        let m4 = set.get("M4").unwrap();
        let ms4 = set.get("MS4").unwrap();
        let msf = set.get("MSf").unwrap();

        assert!((m4.f - m2.f * m2.f).abs() < 1e-12);
        assert!((signed_degrees(m4.u - 2.0 * m2.u)).abs() < 1e-9);
        assert!((signed_degrees(m4.v0 - 2.0 * m2.v0)).abs() < 1e-9);
        assert!((ms4.f - m2.f * s2.f).abs() < 1e-12);
        // Negative weights still raise f to |w|, but subtract u and V0
        assert!((msf.f - m2.f).abs() < 1e-12);
        assert!((signed_degrees(msf.u + m2.u)).abs() < 1e-9);
        assert!((signed_degrees(msf.v0 - (s2.v0 - m2.v0))).abs() < 1e-9);
    }

    #[test]
    fn node_factors_stay_near_unity() {
        let catalog = ConstituentCatalog::builtin();
        let set = compute_nodal_factors(&catalog, &key_2024());
        for (name, lo, hi) in [("M2", 0.95, 1.05), ("K1", 0.85, 1.15), ("O1", 0.78, 1.22), ("S2", 1.0, 1.0)] {
            let f = set.get(name).unwrap().f;
            assert!(f >= lo - 1e-12 && f <= hi + 1e-12, "{name} f = {f}");
        }
    }

    #[test]
    fn inclination_spans_nodal_range() {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for node in (0..360).step_by(5) {
            let args = AstronomicalArguments {
                centuries: 1.0,
                hour_angle: 0.0,
                moon: 0.0,
                sun: 0.0,
                lunar_perigee: 0.0,
                solar_perigee: 0.0,
                lunar_node: node as f64,
            };
            let angles = OrbitalAngles::from_arguments(&args);
            lo = lo.min(angles.inclination);
            hi = hi.max(angles.inclination);
            assert!(angles.nu.abs() < 13.1, "nu = {}", angles.nu);
            assert!(angles.xi.abs() < 12.1, "xi = {}", angles.xi);
        }
        assert!((hi - (obliquity() + lunar_inclination())).abs() < 1e-6);
        assert!((lo - (obliquity() - lunar_inclination())).abs() < 0.01);
    }

    #[test]
    fn node_at_equinox_gives_zero_corrections() {
        let args = AstronomicalArguments {
            centuries: 0.0,
            hour_angle: 0.0,
            moon: 0.0,
            sun: 0.0,
            lunar_perigee: 0.0,
            solar_perigee: 0.0,
            lunar_node: 0.0,
        };
        let angles = OrbitalAngles::from_arguments(&args);
        assert!(angles.xi.abs() < 1e-9);
        assert!(angles.nu.abs() < 1e-9);
        assert!(angles.nu_prime.abs() < 1e-9);
        assert!(angles.two_nu_pp.abs() < 1e-9);
    }

    #[test]
    fn key_anchors_follow_meridian() {
        // +05:00 means local standard time runs five hours behind UTC
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let key = NodalKey::for_instant(instant, 300);
        assert_eq!(key.year, 2023);
        assert_eq!(key.day, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(key.year_start(), Utc.with_ymd_and_hms(2023, 1, 1, 5, 0, 0).unwrap());
        assert_eq!(
            key.representative_instant(),
            Utc.with_ymd_and_hms(2024, 1, 1, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn v0_advances_at_constituent_speed() {
        // V0 for next year's start ≈ V0 now + speed × hours in the year (mod 360)
        let catalog = ConstituentCatalog::builtin();
        let k1 = NodalKey::for_instant(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(), 0);
        let k2 = NodalKey::for_instant(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(), 0);
        let a = compute_nodal_factors(&catalog, &k1);
        let b = compute_nodal_factors(&catalog, &k2);
        let hours = hours_since_year_start(k2.year_start(), &k1);
        for name in ["M2", "S2", "K1", "O1", "N2"] {
            let speed = catalog.get(name).unwrap().speed();
            let predicted = normalize_degrees(a.get(name).unwrap().v0 + speed * hours);
            let actual = b.get(name).unwrap().v0;
            let diff = signed_degrees(predicted - actual).abs();
            assert!(diff < 0.05, "{name}: V0 drift {diff}");
        }
    }

    #[test]
    fn table_keeps_first_insert() {
        let catalog = ConstituentCatalog::builtin();
        let table = NodalTable::new();
        let key = key_2024();
        let first = table.insert(compute_nodal_factors(&catalog, &key));
        let second = table.insert(compute_nodal_factors(&catalog, &key));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);

        let provider = NodalFactors::new(&catalog, &table);
        assert!(Arc::ptr_eq(&provider.get(&key), &first));
    }
}
