use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Registered pollutant codes. Readings may carry other keys; the detection
/// pipeline ignores them, but nothing in this crate constructs one from an
/// arbitrary string without going through the fallible parse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
pub enum Pollutant {
    #[serde(rename = "PM2.5")]
    #[strum(serialize = "PM2.5")]
    Pm25,
    #[serde(rename = "PM10")]
    #[strum(serialize = "PM10")]
    Pm10,
    #[serde(rename = "NO2")]
    #[strum(serialize = "NO2")]
    No2,
    #[serde(rename = "SO2")]
    #[strum(serialize = "SO2")]
    So2,
    #[serde(rename = "O3")]
    #[strum(serialize = "O3")]
    O3,
}

impl Pollutant {
    /// Parses a registry code ("PM2.5", "NO2", ...). Unregistered codes yield
    /// `None` so callers can ignore them instead of failing a whole reading.
    pub fn from_code(code: &str) -> Option<Self> {
        code.parse().ok()
    }
}

/// WHO guideline concentrations in µg/m³ (24-hour mean, 8-hour for ozone).
/// Immutable once constructed; the dangerous limit is derived as twice the
/// guideline and never stored separately.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    guidelines: BTreeMap<Pollutant, f64>,
}

impl ThresholdTable {
    /// The published WHO guideline values.
    pub fn who_defaults() -> Self {
        let guidelines = BTreeMap::from([
            (Pollutant::Pm25, 15.0),
            (Pollutant::Pm10, 45.0),
            (Pollutant::No2, 25.0),
            (Pollutant::So2, 40.0),
            (Pollutant::O3, 100.0),
        ]);
        Self { guidelines }
    }

    /// Builds a table from the defaults with per-deployment overrides keyed by
    /// registry code. Unregistered override keys are ignored.
    pub fn with_overrides(overrides: &BTreeMap<String, f64>) -> Self {
        let mut table = Self::who_defaults();
        for (code, value) in overrides {
            if let Some(pollutant) = Pollutant::from_code(code) {
                table.guidelines.insert(pollutant, *value);
            }
        }
        table
    }

    pub fn guideline(&self, pollutant: Pollutant) -> Option<f64> {
        self.guidelines.get(&pollutant).copied()
    }

    /// Dangerous limit: twice the guideline.
    pub fn dangerous(&self, pollutant: Pollutant) -> Option<f64> {
        self.guideline(pollutant).map(|g| g * 2.0)
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::who_defaults()
    }
}
