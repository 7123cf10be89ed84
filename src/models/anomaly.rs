use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use super::pollutant::Pollutant;
use super::reading::Reading;

/// Which detector produced a record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnomalyKind {
    ThresholdExceeded,
    StatisticalAnomaly,
    RegionalAnomaly,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Danger,
}

/// Detector-specific comparison values backing a finding. Serialized untagged:
/// the field names are disjoint, so the JSON stays flat like the original
/// records downstream consumers already parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AnomalyEvidence {
    Threshold {
        guideline: f64,
        dangerous: f64,
    },
    Statistical {
        mean: f64,
        z_score: f64,
        percent_change: f64,
    },
    Regional {
        regional_mean: f64,
        percent_diff: f64,
    },
}

/// One anomaly finding for one pollutant of one reading. Immutable; owned by
/// the caller once the engine returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnomalyRecord {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub parameter: Pollutant,
    pub value: f64,
    pub evidence: AnomalyEvidence,
    pub severity: Severity,
    pub message: String,
}

/// An anomaly record paired with the reading that triggered it and the
/// detection instant: the unit handed to persistence and fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnomalyAlert {
    pub id: Uuid,
    pub reading: Reading,
    pub record: AnomalyRecord,
    pub detected_at: DateTime<Utc>,
}

impl AnomalyAlert {
    pub fn new(reading: Reading, record: AnomalyRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            reading,
            record,
            detected_at: Utc::now(),
        }
    }
}
