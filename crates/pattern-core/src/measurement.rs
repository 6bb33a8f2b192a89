//! Body measurements, standard sizes and scale factors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A measured body or garment dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Bust,
    Waist,
    Hip,
    Shoulder,
    Length,
    Sleeve,
    Inseam,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Bust,
        Dimension::Waist,
        Dimension::Hip,
        Dimension::Shoulder,
        Dimension::Length,
        Dimension::Sleeve,
        Dimension::Inseam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Bust => "bust",
            Dimension::Waist => "waist",
            Dimension::Hip => "hip",
            Dimension::Shoulder => "shoulder",
            Dimension::Length => "length",
            Dimension::Sleeve => "sleeve",
            Dimension::Inseam => "inseam",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lengths per dimension; any subset may be populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementVector(BTreeMap<Dimension, f64>);

impl MeasurementVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, dimension: Dimension, value: f64) -> Self {
        self.0.insert(dimension, value);
        self
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        self.0.insert(dimension, value);
    }

    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.0.get(&dimension).copied()
    }

    pub fn contains(&self, dimension: Dimension) -> bool {
        self.0.contains_key(&dimension)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(&d, &v)| (d, v))
    }

    /// This vector with every dimension of `overrides` replacing its own.
    pub fn overridden_by(&self, overrides: &MeasurementVector) -> MeasurementVector {
        let mut out = self.clone();
        for (d, v) in overrides.iter() {
            out.set(d, v);
        }
        out
    }

    /// This vector with gaps filled from `fallback`.
    pub fn filled_from(&self, fallback: &MeasurementVector) -> MeasurementVector {
        fallback.overridden_by(self)
    }

    /// First entry that is not finite and positive.
    pub fn first_invalid(&self) -> Option<(Dimension, f64)> {
        self.iter().find(|(_, v)| !v.is_finite() || *v <= 0.0)
    }

    /// Every value must be finite and positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.first_invalid() {
            Some((d, v)) => Err(ConfigError::InvalidSizeProfile {
                details: format!("{d} must be finite and positive, got {v}"),
            }),
            None => Ok(()),
        }
    }
}

impl FromIterator<(Dimension, f64)> for MeasurementVector {
    fn from_iter<I: IntoIterator<Item = (Dimension, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Preset sizes with a complete measurement vector each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StandardSize {
    XS,
    S,
    M,
    L,
    XL,
}

impl StandardSize {
    pub const ALL: [StandardSize; 5] = [
        StandardSize::XS,
        StandardSize::S,
        StandardSize::M,
        StandardSize::L,
        StandardSize::XL,
    ];

    /// Body measurements in centimetres.
    pub fn measurements(&self) -> MeasurementVector {
        // bust, waist, hip, shoulder, back length, sleeve, inseam
        let row: [f64; 7] = match self {
            StandardSize::XS => [82.0, 62.0, 87.0, 36.0, 38.0, 58.0, 76.0],
            StandardSize::S => [88.0, 68.0, 93.0, 38.0, 39.0, 59.0, 77.0],
            StandardSize::M => [94.0, 74.0, 99.0, 40.0, 40.0, 60.0, 78.0],
            StandardSize::L => [100.0, 80.0, 105.0, 42.0, 41.0, 61.0, 79.0],
            StandardSize::XL => [106.0, 86.0, 111.0, 44.0, 42.0, 62.0, 80.0],
        };
        Dimension::ALL.into_iter().zip(row).collect()
    }

    /// The size closest to `partial` over the dimensions it populates
    /// (least squares; ties go to the smaller size). Empty input gives M.
    pub fn nearest(partial: &MeasurementVector) -> StandardSize {
        if partial.is_empty() {
            return StandardSize::M;
        }
        let mut best = StandardSize::M;
        let mut best_cost = f64::INFINITY;
        for size in StandardSize::ALL {
            let table = size.measurements();
            let cost: f64 = partial
                .iter()
                .filter_map(|(d, v)| table.get(d).map(|t| (t - v).powi(2)))
                .sum();
            if cost < best_cost {
                best_cost = cost;
                best = size;
            }
        }
        best
    }
}

impl fmt::Display for StandardSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::str::FromStr for StandardSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XS" => Ok(StandardSize::XS),
            "S" => Ok(StandardSize::S),
            "M" => Ok(StandardSize::M),
            "L" => Ok(StandardSize::L),
            "XL" => Ok(StandardSize::XL),
            other => Err(ConfigError::InvalidSizeProfile {
                details: format!("unknown standard size '{other}'"),
            }),
        }
    }
}

/// How the target size of a pattern is specified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeProfile {
    /// A preset size.
    Standard(StandardSize),
    /// Explicit targets; missing dimensions are left unscaled.
    Measurements(MeasurementVector),
    /// Explicit targets with gaps filled from the nearest preset size.
    Filled(MeasurementVector),
}

impl SizeProfile {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SizeProfile::Standard(_) => Ok(()),
            SizeProfile::Measurements(mv) | SizeProfile::Filled(mv) => mv.validate(),
        }
    }

    /// Target measurements this profile asks for.
    pub fn targets(&self) -> MeasurementVector {
        match self {
            SizeProfile::Standard(size) => size.measurements(),
            SizeProfile::Measurements(mv) => mv.clone(),
            SizeProfile::Filled(mv) => mv.filled_from(&StandardSize::nearest(mv).measurements()),
        }
    }

    /// `target / base` for every dimension both sides populate.
    pub fn scale_factors(&self, base: &MeasurementVector) -> ScaleFactors {
        let targets = self.targets();
        base.iter()
            .filter(|(_, b)| *b > 0.0)
            .filter_map(|(d, b)| targets.get(d).map(|t| (d, t / b)))
            .collect()
    }
}

/// Per-dimension scale factors; absent dimensions scale by 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaleFactors(BTreeMap<Dimension, f64>);

impl ScaleFactors {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        self.0.get(&dimension).copied().unwrap_or(1.0)
    }

    pub fn is_identity(&self) -> bool {
        self.0.values().all(|&f| f == 1.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(&d, &v)| (d, v))
    }
}

impl FromIterator<(Dimension, f64)> for ScaleFactors {
    fn from_iter<I: IntoIterator<Item = (Dimension, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
