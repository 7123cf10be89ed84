//! Statistical deviation against the same location's recent history.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{
    reading::parse_value, AnomalyEvidence, AnomalyKind, AnomalyRecord, Pollutant, Reading,
    Severity,
};

use super::DetectionConfig;

/// Flags pollutants whose current value deviates from the historical
/// distribution, by z-score or by percent change against the mean.
///
/// A no-op until the window holds at least `min_history_points` entries,
/// counted once across the whole window rather than per pollutant.
pub fn evaluate(
    reading: &Reading,
    history: &[Reading],
    config: &DetectionConfig,
) -> Vec<AnomalyRecord> {
    let mut anomalies = Vec::new();

    if history.len() < config.min_history_points {
        return anomalies;
    }

    // Per-pollutant historical series; individual bad fields are dropped
    let mut series: BTreeMap<Pollutant, Vec<f64>> = BTreeMap::new();
    for record in history {
        for (pollutant, value) in record.numeric_parameters() {
            series.entry(pollutant).or_default().push(value);
        }
    }

    for (code, raw) in &reading.parameters {
        let Some(pollutant) = Pollutant::from_code(code) else {
            continue;
        };
        let Some(value) = parse_value(raw) else {
            debug!(parameter = %code, "non-numeric value, skipping statistical check");
            continue;
        };
        let Some(values) = series.get(&pollutant).filter(|v| !v.is_empty()) else {
            continue;
        };

        let (mean, _) = population_stats(values);
        let z = z_score(value, values);
        let percent_change = if mean > 0.0 {
            (value - mean) / mean * 100.0
        } else {
            0.0
        };

        if z.abs() > config.z_score_warning || percent_change.abs() > config.percent_change_warning
        {
            let mut severity = Severity::Warning;
            let mut message = String::new();

            if z.abs() > config.z_score_warning {
                severity = if z.abs() > config.z_score_danger {
                    Severity::Danger
                } else {
                    Severity::Warning
                };
                message = format!("{pollutant} abnormal change (Z-score: {z:.2})");
            }

            // Evaluated second on purpose: when both conditions hold, the
            // percent-change branch decides the final message, and escalates
            // severity without ever downgrading it.
            if percent_change.abs() > config.percent_change_warning {
                let direction = if percent_change > 0.0 {
                    "increase"
                } else {
                    "decrease"
                };
                if percent_change.abs() > config.percent_change_danger {
                    severity = Severity::Danger;
                }
                message = format!("{pollutant} {:.1}% {direction}", percent_change.abs());
            }

            anomalies.push(AnomalyRecord {
                kind: AnomalyKind::StatisticalAnomaly,
                parameter: pollutant,
                value,
                evidence: AnomalyEvidence::Statistical {
                    mean,
                    z_score: z,
                    percent_change,
                },
                severity,
                message,
            });
        }
    }

    anomalies
}

/// Population mean and standard deviation.
fn population_stats(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Z-score of `value` within `values`; zero when the series is too short to
/// have a spread or has none.
fn z_score(value: f64, values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let (mean, std) = population_stats(values);
    if std == 0.0 {
        return 0.0;
    }
    (value - mean) / std
}
