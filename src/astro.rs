//! Fundamental astronomical arguments for harmonic tide prediction.
//!
//! Secular polynomial ephemeris of the mean longitudes used in the equilibrium
//! arguments, referred to Greenwich mean noon 1899-12-31 (epoch 1900.0, JD 2 415 020.0).
//! Coefficients follow the standard tidal-harmonic reference table (Schureman 1958,
//! Table 1) and are written in degrees, arcminutes and arcseconds as published.
//! Accuracy is well under 0.01° for dates within a few centuries of the epoch.

use chrono::{DateTime, TimeZone, Utc};

/// JD of the 1900.0 reference epoch.
pub const EPOCH_JD: f64 = 2_415_020.0;

/// Days per Julian century.
pub const JULIAN_CENTURY: f64 = 36_525.0;

/// JD of the Unix epoch.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Mean longitudes and the mean solar hour angle at an instant, in degrees [0, 360).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AstronomicalArguments {
    /// Julian centuries since the 1900.0 epoch
    pub centuries: f64,
    /// Hour angle of the mean sun at Greenwich (T)
    pub hour_angle: f64,
    /// Mean longitude of the moon (s)
    pub moon: f64,
    /// Mean longitude of the sun (h)
    pub sun: f64,
    /// Mean longitude of the lunar perigee (p)
    pub lunar_perigee: f64,
    /// Mean longitude of the solar perigee (p₁)
    pub solar_perigee: f64,
    /// Longitude of the moon's ascending node (N)
    pub lunar_node: f64,
}

impl AstronomicalArguments {
    /// The angles in argument-coefficient order: T, s, h, p, p₁.
    pub fn as_argument_vector(&self) -> [f64; 5] {
        [
            self.hour_angle,
            self.moon,
            self.sun,
            self.lunar_perigee,
            self.solar_perigee,
        ]
    }
}

/// Degrees from a degrees/arcminutes/arcseconds triple.
pub fn dms(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

fn arcsec(seconds: f64) -> f64 {
    seconds / 3600.0
}

/// Full revolutions in degrees.
fn rev(n: f64) -> f64 {
    n * 360.0
}

/// Wrap an angle into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle into (-180, 180].
pub fn signed_degrees(angle: f64) -> f64 {
    let wrapped = normalize_degrees(angle);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Julian date of a UTC instant.
pub fn julian_date(instant: DateTime<Utc>) -> f64 {
    let seconds = instant.timestamp() as f64 + instant.timestamp_subsec_nanos() as f64 * 1e-9;
    UNIX_EPOCH_JD + seconds / 86_400.0
}

/// Days elapsed since the 1900.0 epoch.
pub fn days_since_epoch(instant: DateTime<Utc>) -> f64 {
    // Split at whole seconds to keep precision in the fractional day
    let epoch = Utc
        .with_ymd_and_hms(1899, 12, 31, 12, 0, 0)
        .single()
        .map(|e| e.timestamp())
        .unwrap_or(-2_209_032_000);
    let whole = (instant.timestamp() - epoch) as f64;
    (whole + instant.timestamp_subsec_nanos() as f64 * 1e-9) / 86_400.0
}

/// Julian centuries since the 1900.0 epoch.
pub fn julian_centuries(instant: DateTime<Utc>) -> f64 {
    days_since_epoch(instant) / JULIAN_CENTURY
}

/// Evaluate the fundamental angles at `instant`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tide_engine::astro::fundamental_arguments;
///
/// let epoch = Utc.with_ymd_and_hms(1899, 12, 31, 12, 0, 0).unwrap();
/// let args = fundamental_arguments(epoch);
/// assert!(args.centuries.abs() < 1e-12);
/// assert!((args.moon - 270.437_422).abs() < 1e-5);
/// assert!(args.hour_angle.abs() < 1e-9);
/// ```
pub fn fundamental_arguments(instant: DateTime<Utc>) -> AstronomicalArguments {
    let days = days_since_epoch(instant);
    let t = days / JULIAN_CENTURY;
    let t2 = t * t;
    let t3 = t2 * t;

    let moon = dms(270.0, 26.0, 14.72) + (rev(1336.0) + arcsec(1_108_411.20)) * t
        + arcsec(9.09) * t2
        + arcsec(0.0068) * t3;

    let sun = dms(279.0, 41.0, 48.04) + arcsec(129_602_768.13) * t + arcsec(1.089) * t2;

    let lunar_perigee = dms(334.0, 19.0, 40.87) + (rev(11.0) + arcsec(392_515.94)) * t
        - arcsec(37.24) * t2
        - arcsec(0.045) * t3;

    let lunar_node = dms(259.0, 10.0, 57.12) - (rev(5.0) + arcsec(482_912.63)) * t
        + arcsec(7.58) * t2
        + arcsec(0.008) * t3;

    let solar_perigee =
        dms(281.0, 13.0, 15.0) + arcsec(6_189.03) * t + arcsec(1.63) * t2 + arcsec(0.012) * t3;

    // Mean sun crosses the Greenwich meridian at the epoch (mean noon)
    let hour_angle = 360.0 * days;

    AstronomicalArguments {
        centuries: t,
        hour_angle: normalize_degrees(hour_angle),
        moon: normalize_degrees(moon),
        sun: normalize_degrees(sun),
        lunar_perigee: normalize_degrees(lunar_perigee),
        solar_perigee: normalize_degrees(solar_perigee),
        lunar_node: normalize_degrees(lunar_node),
    }
}
