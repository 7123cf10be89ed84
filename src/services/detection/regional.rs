//! Consistency against concurrent readings from nearby stations.

use chrono::Duration;
use tracing::warn;

use crate::models::{
    reading::parse_value, AnomalyEvidence, AnomalyKind, AnomalyRecord, Pollutant, Reading,
    Severity,
};
use crate::services::geo::haversine_km;

use super::DetectionConfig;

/// Flags pollutants that diverge sharply from the mean of nearby stations
/// within the trailing regional window.
///
/// An unparseable timestamp on the current reading aborts this detector only;
/// history entries with bad timestamps are skipped one by one. When no
/// neighbour qualifies, the detector is a no-op.
pub fn evaluate(
    reading: &Reading,
    history: &[Reading],
    config: &DetectionConfig,
) -> Vec<AnomalyRecord> {
    let mut anomalies = Vec::new();

    let Some(current_at) = reading.parsed_timestamp() else {
        warn!(
            timestamp = %reading.timestamp,
            "unparseable timestamp, skipping regional check for this reading"
        );
        return anomalies;
    };
    let window_start = current_at - Duration::hours(config.regional_window_hours);

    let nearby: Vec<&Reading> = history
        .iter()
        .filter(|entry| {
            entry
                .parsed_timestamp()
                .map_or(false, |at| window_start <= at && at <= current_at)
        })
        .filter(|entry| {
            haversine_km(
                reading.latitude,
                reading.longitude,
                entry.latitude,
                entry.longitude,
            ) <= config.regional_radius_km
        })
        .collect();

    if nearby.is_empty() {
        return anomalies;
    }

    for (code, raw) in &reading.parameters {
        let Some(pollutant) = Pollutant::from_code(code) else {
            continue;
        };
        let Some(value) = parse_value(raw) else {
            continue;
        };

        // Neighbours lacking this pollutant are skipped for its mean only
        let values: Vec<f64> = nearby
            .iter()
            .filter_map(|entry| entry.value_of(pollutant))
            .collect();
        if values.is_empty() {
            continue;
        }
        let regional_mean = values.iter().sum::<f64>() / values.len() as f64;

        let percent_diff = if regional_mean > 0.0 {
            (value - regional_mean) / regional_mean * 100.0
        } else {
            0.0
        };

        if percent_diff.abs() > config.regional_percent_warning {
            let direction = if percent_diff > 0.0 { "higher" } else { "lower" };
            let severity = if percent_diff.abs() > config.regional_percent_danger {
                Severity::Danger
            } else {
                Severity::Warning
            };

            anomalies.push(AnomalyRecord {
                kind: AnomalyKind::RegionalAnomaly,
                parameter: pollutant,
                value,
                evidence: AnomalyEvidence::Regional {
                    regional_mean,
                    percent_diff,
                },
                severity,
                message: format!(
                    "{pollutant} is {:.1}% {direction} than regional average",
                    percent_diff.abs()
                ),
            });
        }
    }

    anomalies
}
