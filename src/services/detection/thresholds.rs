//! WHO guideline threshold evaluation.

use crate::models::{
    reading::parse_value, AnomalyEvidence, AnomalyKind, AnomalyRecord, Pollutant, Reading,
    Severity, ThresholdTable,
};

/// Compares every registered pollutant in the reading against the guideline
/// and dangerous limits. Comparison is strict: a value exactly at a limit is
/// not anomalous. Each pollutant is judged independently.
pub fn evaluate(reading: &Reading, thresholds: &ThresholdTable) -> Vec<AnomalyRecord> {
    let mut anomalies = Vec::new();

    for (code, raw) in &reading.parameters {
        let Some(pollutant) = Pollutant::from_code(code) else {
            continue;
        };
        let Some(value) = parse_value(raw) else {
            continue;
        };
        let Some(guideline) = thresholds.guideline(pollutant) else {
            continue;
        };
        let dangerous = guideline * 2.0;

        if value > guideline {
            let mut severity = Severity::Warning;
            let mut message = format!(
                "{pollutant} exceeded WHO threshold ({value:.2} > {guideline:.2})"
            );

            if value > dangerous {
                severity = Severity::Danger;
                message = format!(
                    "{pollutant} exceeded dangerous threshold ({value:.2} > {dangerous:.2})"
                );
            }

            anomalies.push(AnomalyRecord {
                kind: AnomalyKind::ThresholdExceeded,
                parameter: pollutant,
                value,
                evidence: AnomalyEvidence::Threshold {
                    guideline,
                    dangerous,
                },
                severity,
                message,
            });
        }
    }

    anomalies
}
