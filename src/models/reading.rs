use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::pollutant::Pollutant;

/// One geotagged sensor observation.
///
/// The timestamp is kept as the ISO-8601 string supplied by the station; the
/// regional detector parses it per invocation and degrades gracefully when it
/// does not parse. `parameters` is an ordered map so every pass over a reading
/// visits pollutants in a stable order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    /// Client-supplied identifier, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// ISO-8601 instant, UTC
    pub timestamp: String,
    /// Pollutant code -> measured value. Values are kept as raw JSON so a
    /// single bad field skips that field, never the whole reading.
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Reading {
    /// Parses the reading's timestamp. Accepts RFC 3339 with offset as well as
    /// the naive `YYYY-MM-DDTHH:MM:SS[.ffffff]` form (with or without a
    /// trailing `Z`) that stations commonly emit.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Iterates the registered pollutants of this reading whose values parse
    /// as numbers. Unregistered codes and non-numeric values are skipped.
    pub fn numeric_parameters(&self) -> impl Iterator<Item = (Pollutant, f64)> + '_ {
        self.parameters.iter().filter_map(|(code, raw)| {
            let pollutant = Pollutant::from_code(code)?;
            let value = parse_value(raw)?;
            Some((pollutant, value))
        })
    }

    /// Numeric value for one pollutant, if present and parseable.
    pub fn value_of(&self, pollutant: Pollutant) -> Option<f64> {
        self.parameters
            .get(&pollutant.to_string())
            .and_then(parse_value)
    }
}

/// Per-field parse-or-skip: JSON numbers and numeric strings are accepted,
/// everything else is reported as unparseable for that field alone.
pub fn parse_value(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    let naive = raw.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}
