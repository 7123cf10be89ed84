//! Anomaly detection engine.
//!
//! Three detectors run in a fixed order against one reading and one
//! caller-supplied historical window: WHO threshold comparison, statistical
//! deviation against the same location's recent history, and consistency
//! against nearby stations. The engine is pure: it performs no I/O, holds no
//! mutable state, and is safe to call concurrently from any number of tasks.

pub mod regional;
pub mod statistical;
pub mod thresholds;

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;
use validator::Validate;

use crate::models::{AnomalyKind, AnomalyRecord, Reading, ThresholdTable};

/// Detection tunables. Defaults are the calibrated production values; a
/// deployment can override any of them through the `detection` config block.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    /// |z-score| above which a statistical anomaly is flagged
    #[serde(default = "default_z_score_warning")]
    #[validate(range(min = 0.0))]
    pub z_score_warning: f64,

    /// |z-score| above which the finding escalates to danger
    #[serde(default = "default_z_score_danger")]
    #[validate(range(min = 0.0))]
    pub z_score_danger: f64,

    /// |percent change| vs. the historical mean that flags an anomaly
    #[serde(default = "default_percent_change_warning")]
    #[validate(range(min = 0.0))]
    pub percent_change_warning: f64,

    /// |percent change| that escalates to danger
    #[serde(default = "default_percent_change_danger")]
    #[validate(range(min = 0.0))]
    pub percent_change_danger: f64,

    /// |percent difference| vs. the regional mean that flags an anomaly
    #[serde(default = "default_regional_percent_warning")]
    #[validate(range(min = 0.0))]
    pub regional_percent_warning: f64,

    /// |percent difference| that escalates to danger
    #[serde(default = "default_regional_percent_danger")]
    #[validate(range(min = 0.0))]
    pub regional_percent_danger: f64,

    /// Radius (km) within which another station counts as a neighbour
    #[serde(default = "default_regional_radius_km")]
    #[validate(range(min = 0.1))]
    pub regional_radius_km: f64,

    /// Trailing window (hours) for the regional comparison
    #[serde(default = "default_regional_window_hours")]
    #[validate(range(min = 1))]
    pub regional_window_hours: i64,

    /// Trailing window (hours) for the statistical comparison
    #[serde(default = "default_statistical_window_hours")]
    #[validate(range(min = 1))]
    pub statistical_window_hours: i64,

    /// Half-side (degrees) of the same-location bounding box
    #[serde(default = "default_statistical_bbox_degrees")]
    #[validate(range(min = 0.0))]
    pub statistical_bbox_degrees: f64,

    /// Minimum historical points before the statistical detector runs
    #[serde(default = "default_min_history_points")]
    #[validate(range(min = 1))]
    pub min_history_points: usize,

    /// Upper bound on the historical window fetched per reading
    #[serde(default = "default_max_history_points")]
    #[validate(range(min = 1))]
    pub max_history_points: usize,

    /// Per-deployment WHO guideline overrides, keyed by pollutant code
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

fn default_z_score_warning() -> f64 {
    3.0
}
fn default_z_score_danger() -> f64 {
    5.0
}
fn default_percent_change_warning() -> f64 {
    50.0
}
fn default_percent_change_danger() -> f64 {
    100.0
}
fn default_regional_percent_warning() -> f64 {
    75.0
}
fn default_regional_percent_danger() -> f64 {
    150.0
}
fn default_regional_radius_km() -> f64 {
    25.0
}
fn default_regional_window_hours() -> i64 {
    6
}
fn default_statistical_window_hours() -> i64 {
    24
}
fn default_statistical_bbox_degrees() -> f64 {
    0.01
}
fn default_min_history_points() -> usize {
    5
}
fn default_max_history_points() -> usize {
    5000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            z_score_warning: default_z_score_warning(),
            z_score_danger: default_z_score_danger(),
            percent_change_warning: default_percent_change_warning(),
            percent_change_danger: default_percent_change_danger(),
            regional_percent_warning: default_regional_percent_warning(),
            regional_percent_danger: default_regional_percent_danger(),
            regional_radius_km: default_regional_radius_km(),
            regional_window_hours: default_regional_window_hours(),
            statistical_window_hours: default_statistical_window_hours(),
            statistical_bbox_degrees: default_statistical_bbox_degrees(),
            min_history_points: default_min_history_points(),
            max_history_points: default_max_history_points(),
            thresholds: BTreeMap::new(),
        }
    }
}

/// The assembled engine: an immutable threshold table plus tunables.
#[derive(Clone, Debug)]
pub struct DetectionEngine {
    thresholds: ThresholdTable,
    config: DetectionConfig,
}

impl DetectionEngine {
    pub fn new(thresholds: ThresholdTable, config: DetectionConfig) -> Self {
        Self { thresholds, config }
    }

    /// Builds the engine from a config block: WHO defaults merged with any
    /// per-deployment threshold overrides.
    pub fn from_config(config: DetectionConfig) -> Self {
        let thresholds = ThresholdTable::with_overrides(&config.thresholds);
        Self::new(thresholds, config)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    /// Evaluates one reading against its historical window.
    ///
    /// Detector order is a correctness requirement, not a preference: the
    /// regional suppression below inspects the findings accumulated so far,
    /// so threshold findings come first, then statistical, then regional.
    pub fn evaluate(&self, reading: &Reading, history: &[Reading]) -> Vec<AnomalyRecord> {
        let mut records = thresholds::evaluate(reading, &self.thresholds);
        records.extend(statistical::evaluate(reading, history, &self.config));

        for candidate in regional::evaluate(reading, history, &self.config) {
            // A regional finding is dropped when the pollutant already has a
            // statistical or regional finding in this run. Statistical
            // findings are never suppressed retroactively; the asymmetry is
            // part of the contract.
            let duplicate = records.iter().any(|record| {
                record.parameter == candidate.parameter
                    && matches!(
                        record.kind,
                        AnomalyKind::StatisticalAnomaly | AnomalyKind::RegionalAnomaly
                    )
            });
            if duplicate {
                debug!(
                    parameter = %candidate.parameter,
                    "suppressing regional finding duplicated by an earlier detector"
                );
                continue;
            }
            records.push(candidate);
        }

        records
    }
}
