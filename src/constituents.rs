//! # Harmonic Constituent Catalog
//!
//! Static table of the named tidal constituents the engine knows about. Each entry is
//! either a **basic** constituent, described by its Doodson-style argument coefficients
//! and a node-factor formula, or a **compound** constituent, described by signed
//! weights over a fixed set of base constituents.
//!
//! ## Argument coefficients
//!
//! The equilibrium argument of a basic constituent is
//!
//! ```text
//! V = a₀·T + a₁·s + a₂·h + a₃·p + a₄·p₁ + a₅·90°
//! ```
//!
//! where `T` is the mean solar hour angle and `s, h, p, p₁` are the fundamental
//! angles computed in [`crate::astro`]. The phase correction is
//!
//! ```text
//! u = b₀·ξ + b₁·ν + b₂·ν′ + b₃·2ν″ + b₄·Q + b₅·Qu + b₆·R
//! ```
//!
//! with the orbital angles from [`crate::nodal`].
//!
//! The catalog is extended at ingestion time by `CONST` rows found in the primary
//! harmonic database; built-in definitions always win over file definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Number of base constituents compound weights refer to.
pub const BASE_COUNT: usize = 13;

/// Base constituents, in weight-vector order.
pub const BASE_CONSTITUENTS: [&str; BASE_COUNT] = [
    "Mm", "Mf", "O1", "K1", "P1", "Q1", "J1", "M2", "S2", "N2", "K2", "L2", "M3",
];

/// Rates of the fundamental angles in degrees per mean solar hour:
/// hour angle T, moon s, sun h, lunar perigee p, solar perigee p₁.
pub const ANGLE_SPEEDS: [f64; 5] = [15.0, 0.549_016_5, 0.041_068_6, 0.004_641_8, 0.000_002_0];

/// Closed-form node-factor expressions, named after the Schureman formula numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFactorFormula {
    /// Solar constituents, f = 1
    Unity,
    /// (73) Mm
    F73,
    /// (74) Mf
    F74,
    /// (75) O1, Q1, 2Q1, ρ1
    F75,
    /// (76) J1, θ1
    F76,
    /// (77) OO1
    F77,
    /// (78) M2 and the semidiurnal lunar family
    F78,
    /// (144) lunar terms with the cos²(½I)·(1 − 10 sin²(½I) + 15 sin⁴(½I)) envelope
    F144,
    /// (149) M3
    F149,
    /// (206) M1, f(O1) scaled by 1/Qa
    F206,
    /// (215) L2, f(M2) scaled by 1/Ra
    F215,
    /// (227) K1
    F227,
    /// (235) K2
    F235,
}

impl NodeFactorFormula {
    /// Parse a formula id as written in source files: a Schureman number, a
    /// representative constituent name, or `unity`.
    pub fn parse(raw: &str) -> Option<Self> {
        let formula = match raw.trim().to_ascii_lowercase().as_str() {
            "unity" | "1" | "none" | "solar" => NodeFactorFormula::Unity,
            "73" | "mm" => NodeFactorFormula::F73,
            "74" | "mf" => NodeFactorFormula::F74,
            "75" | "o1" => NodeFactorFormula::F75,
            "76" | "j1" => NodeFactorFormula::F76,
            "77" | "oo1" => NodeFactorFormula::F77,
            "78" | "m2" => NodeFactorFormula::F78,
            "144" => NodeFactorFormula::F144,
            "149" | "m3" => NodeFactorFormula::F149,
            "206" | "m1" => NodeFactorFormula::F206,
            "215" | "l2" => NodeFactorFormula::F215,
            "227" | "k1" => NodeFactorFormula::F227,
            "235" | "k2" => NodeFactorFormula::F235,
            _ => return None,
        };
        Some(formula)
    }
}

/// A constituent defined directly by astronomical arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicConstituent {
    pub name: String,
    /// Angular speed, degrees per hour
    pub speed: f64,
    /// Coefficients of (T, s, h, p, p₁, 90°)
    pub arguments: [i32; 6],
    /// Coefficients of (ξ, ν, ν′, 2ν″, Q, Qu, R)
    pub corrections: [f64; 7],
    pub formula: NodeFactorFormula,
}

/// A constituent formed from the base constituents (shallow-water and compound tides).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompoundConstituent {
    pub name: String,
    /// Angular speed, degrees per hour
    pub speed: f64,
    /// Signed weight per entry of [`BASE_CONSTITUENTS`]
    pub weights: [f64; BASE_COUNT],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constituent {
    Basic(BasicConstituent),
    Compound(CompoundConstituent),
}

impl Constituent {
    pub fn name(&self) -> &str {
        match self {
            Constituent::Basic(c) => &c.name,
            Constituent::Compound(c) => &c.name,
        }
    }

    /// Angular speed in degrees per hour.
    pub fn speed(&self) -> f64 {
        match self {
            Constituent::Basic(c) => c.speed,
            Constituent::Compound(c) => c.speed,
        }
    }
}

impl BasicConstituent {
    /// Speed implied by the argument coefficients.
    pub fn argument_speed(arguments: &[i32; 6]) -> f64 {
        arguments
            .iter()
            .zip(ANGLE_SPEEDS.iter())
            .map(|(&a, &rate)| a as f64 * rate)
            .sum()
    }
}

impl CompoundConstituent {
    /// Build a compound from `(base name, weight)` pairs. Unknown base names yield `None`.
    pub fn from_pairs(name: &str, pairs: &[(&str, f64)], catalog: &ConstituentCatalog) -> Option<Self> {
        let mut weights = [0.0; BASE_COUNT];
        for &(base, weight) in pairs {
            let slot = BASE_CONSTITUENTS.iter().position(|b| *b == base)?;
            weights[slot] += weight;
        }
        let speed = compound_speed(&weights, catalog);
        Some(CompoundConstituent {
            name: name.to_string(),
            speed,
            weights,
        })
    }
}

/// Σ weight × base speed.
pub fn compound_speed(weights: &[f64; BASE_COUNT], catalog: &ConstituentCatalog) -> f64 {
    BASE_CONSTITUENTS
        .iter()
        .zip(weights.iter())
        .filter(|(_, w)| **w != 0.0)
        .map(|(base, w)| w * catalog.get(base).map(Constituent::speed).unwrap_or(0.0))
        .sum()
}

/// Name-indexed constituent table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConstituentCatalog {
    entries: Vec<Constituent>,
    index: HashMap<String, usize>,
}

/// (name, speed, T s h p p₁ 90°, ξ ν ν′ 2ν″ Q Qu R, formula)
type BasicRow = (&'static str, f64, [i32; 6], [f64; 7], NodeFactorFormula);

const NO_U: [f64; 7] = [0.0; 7];
const DIURNAL_U: [f64; 7] = [2.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
const SEMIDIURNAL_U: [f64; 7] = [2.0, -2.0, 0.0, 0.0, 0.0, 0.0, 0.0];

const BASIC_TABLE: &[BasicRow] = {
    use NodeFactorFormula::*;
    &[
        ("Sa", 0.041_068_6, [0, 0, 1, 0, 0, 0], NO_U, Unity),
        ("Ssa", 0.082_137_3, [0, 0, 2, 0, 0, 0], NO_U, Unity),
        ("Mm", 0.544_374_7, [0, 1, 0, -1, 0, 0], NO_U, F73),
        ("Mf", 1.098_033_1, [0, 2, 0, 0, 0, 0], [-2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], F74),
        ("2Q1", 12.854_286_2, [1, -4, 1, 2, 0, 1], DIURNAL_U, F75),
        ("Q1", 13.398_660_9, [1, -3, 1, 1, 0, 1], DIURNAL_U, F75),
        ("rho1", 13.471_514_5, [1, -3, 3, -1, 0, 1], DIURNAL_U, F75),
        ("O1", 13.943_035_6, [1, -2, 1, 0, 0, 1], DIURNAL_U, F75),
        ("M1", 14.496_693_9, [1, -1, 1, 1, 0, -1], [1.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0], F206),
        ("pi1", 14.917_864_7, [1, 0, -2, 0, 1, 1], NO_U, Unity),
        ("P1", 14.958_931_4, [1, 0, -1, 0, 0, 1], NO_U, Unity),
        ("S1", 15.0, [1, 0, 0, 0, 0, 2], NO_U, Unity),
        ("K1", 15.041_068_6, [1, 0, 1, 0, 0, -1], [0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0], F227),
        ("psi1", 15.082_135_3, [1, 0, 2, 0, -1, -1], NO_U, Unity),
        ("phi1", 15.123_205_9, [1, 0, 3, 0, 0, -1], NO_U, Unity),
        ("theta1", 15.512_589_7, [1, 1, -1, 1, 0, -1], [0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0], F76),
        ("J1", 15.585_443_3, [1, 1, 1, -1, 0, -1], [0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0], F76),
        ("OO1", 16.139_101_7, [1, 2, 1, 0, 0, -1], [-2.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0], F77),
        ("2N2", 27.895_354_8, [2, -4, 2, 2, 0, 0], SEMIDIURNAL_U, F78),
        ("mu2", 27.968_208_4, [2, -4, 4, 0, 0, 0], SEMIDIURNAL_U, F78),
        ("N2", 28.439_729_5, [2, -3, 2, 1, 0, 0], SEMIDIURNAL_U, F78),
        ("nu2", 28.512_583_1, [2, -3, 4, -1, 0, 0], SEMIDIURNAL_U, F78),
        ("M2", 28.984_104_2, [2, -2, 2, 0, 0, 0], SEMIDIURNAL_U, F78),
        ("lambda2", 29.455_625_3, [2, -1, 0, 1, 0, 2], SEMIDIURNAL_U, F78),
        ("L2", 29.528_478_9, [2, -1, 2, -1, 0, 2], [2.0, -2.0, 0.0, 0.0, 0.0, 0.0, -1.0], F215),
        ("T2", 29.958_933_3, [2, 0, -1, 0, 1, 0], NO_U, Unity),
        ("S2", 30.0, [2, 0, 0, 0, 0, 0], NO_U, Unity),
        ("R2", 30.041_066_7, [2, 0, 1, 0, -1, 2], NO_U, Unity),
        ("K2", 30.082_137_3, [2, 0, 2, 0, 0, 0], [0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0], F235),
        ("M3", 43.476_156_3, [3, -3, 3, 0, 0, 0], [3.0, -3.0, 0.0, 0.0, 0.0, 0.0, 0.0], F149),
    ]
};

const COMPOUND_TABLE: &[(&str, &[(&str, f64)])] = &[
    ("MSf", &[("S2", 1.0), ("M2", -1.0)]),
    ("2SM2", &[("S2", 2.0), ("M2", -1.0)]),
    ("MO3", &[("M2", 1.0), ("O1", 1.0)]),
    ("2MK3", &[("M2", 2.0), ("K1", -1.0)]),
    ("MK3", &[("M2", 1.0), ("K1", 1.0)]),
    ("MN4", &[("M2", 1.0), ("N2", 1.0)]),
    ("M4", &[("M2", 2.0)]),
    ("MS4", &[("M2", 1.0), ("S2", 1.0)]),
    ("MK4", &[("M2", 1.0), ("K2", 1.0)]),
    ("S4", &[("S2", 2.0)]),
    ("2MN6", &[("M2", 2.0), ("N2", 1.0)]),
    ("M6", &[("M2", 3.0)]),
    ("2MS6", &[("M2", 2.0), ("S2", 1.0)]),
    ("S6", &[("S2", 3.0)]),
    ("M8", &[("M2", 4.0)]),
];

impl ConstituentCatalog {
    /// The built-in table: basic constituents first, compounds after.
    pub fn builtin() -> Self {
        let mut catalog = ConstituentCatalog::default();
        for &(name, speed, arguments, corrections, formula) in BASIC_TABLE {
            catalog.insert(Constituent::Basic(BasicConstituent {
                name: name.to_string(),
                speed,
                arguments,
                corrections,
                formula,
            }));
        }
        for &(name, pairs) in COMPOUND_TABLE {
            if let Some(compound) = CompoundConstituent::from_pairs(name, pairs, &catalog) {
                catalog.insert(Constituent::Compound(compound));
            }
        }
        catalog
    }

    fn insert(&mut self, constituent: Constituent) {
        self.index
            .insert(constituent.name().to_string(), self.entries.len());
        self.entries.push(constituent);
    }

    pub fn get(&self, name: &str) -> Option<&Constituent> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Exact lookup, falling back to a case-insensitive match (`RHO1` → `rho1`).
    pub fn resolve(&self, raw: &str) -> Option<&Constituent> {
        let raw = raw.trim();
        self.get(raw)
            .or_else(|| self.entries.iter().find(|c| c.name().eq_ignore_ascii_case(raw)))
    }

    /// Constituents in insertion order; every base precedes the compounds using it.
    pub fn iter(&self) -> impl Iterator<Item = &Constituent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add constituents discovered in a source file. Existing names are kept; returns
    /// the number of constituents actually added.
    pub fn extend(&mut self, discovered: impl IntoIterator<Item = Constituent>) -> usize {
        let mut added = 0;
        for constituent in discovered {
            if let Some(existing) = self.get(constituent.name()) {
                if (existing.speed() - constituent.speed()).abs() > 1e-6 {
                    debug!(
                        constituent = constituent.name(),
                        builtin = existing.speed(),
                        file = constituent.speed(),
                        "speed disagreement, keeping catalog definition"
                    );
                }
                continue;
            }
            self.insert(constituent);
            added += 1;
        }
        added
    }
}
