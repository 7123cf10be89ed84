//! Aggregated statistics over the recent reading history.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::store::{ReadingFilter, ReadingStore, TimeRange};

/// Per-pollutant aggregate over the reporting period.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollutantSummary {
    pub count: usize,
    pub average: f64,
    pub maximum: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecentStatistics {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_readings: usize,
    /// Pollutant code -> aggregate; only codes observed in the period appear
    pub parameters: BTreeMap<String, PollutantSummary>,
}

#[derive(Clone)]
pub struct StatisticsService {
    reading_store: Arc<dyn ReadingStore>,
}

impl StatisticsService {
    pub fn new(reading_store: Arc<dyn ReadingStore>) -> Self {
        Self { reading_store }
    }

    /// Count/average/maximum per pollutant over the trailing period. An empty
    /// store yields an empty summary, not an error.
    #[instrument(skip(self))]
    pub async fn recent_summary(&self, hours: i64) -> Result<RecentStatistics, ServiceError> {
        let end = Utc::now();
        let start = end - Duration::hours(hours);

        let (readings, total_readings) = self
            .reading_store
            .list(ReadingFilter {
                range: Some(TimeRange::new(start, end)),
                limit: usize::MAX,
                ..Default::default()
            })
            .await?;

        let mut sums: BTreeMap<String, (usize, f64, f64)> = BTreeMap::new();
        for stored in &readings {
            for (pollutant, value) in stored.reading.numeric_parameters() {
                let entry = sums
                    .entry(pollutant.to_string())
                    .or_insert((0, 0.0, f64::MIN));
                entry.0 += 1;
                entry.1 += value;
                entry.2 = entry.2.max(value);
            }
        }

        let parameters = sums
            .into_iter()
            .map(|(code, (count, sum, maximum))| {
                (
                    code,
                    PollutantSummary {
                        count,
                        average: sum / count as f64,
                        maximum,
                    },
                )
            })
            .collect();

        Ok(RecentStatistics {
            start,
            end,
            total_readings,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reading;
    use crate::store::InMemoryReadingStore;
    use serde_json::json;
    use std::collections::BTreeMap as Map;

    fn reading(timestamp: DateTime<Utc>, params: &[(&str, f64)]) -> Reading {
        Reading {
            id: None,
            latitude: 41.0,
            longitude: 29.0,
            timestamp: timestamp.to_rfc3339(),
            parameters: params
                .iter()
                .map(|(code, value)| (code.to_string(), json!(value)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn empty_store_yields_empty_summary() {
        let service = StatisticsService::new(Arc::new(InMemoryReadingStore::new()));
        let summary = service.recent_summary(24).await.unwrap();
        assert_eq!(summary.total_readings, 0);
        assert!(summary.parameters.is_empty());
    }

    #[tokio::test]
    async fn aggregates_count_average_and_maximum() {
        let store = Arc::new(InMemoryReadingStore::new());
        let now = Utc::now();
        store
            .insert(reading(now - Duration::hours(1), &[("PM2.5", 10.0), ("NO2", 30.0)]))
            .await
            .unwrap();
        store
            .insert(reading(now - Duration::hours(2), &[("PM2.5", 20.0)]))
            .await
            .unwrap();
        // Outside the 24 h period
        store
            .insert(reading(now - Duration::hours(30), &[("PM2.5", 500.0)]))
            .await
            .unwrap();

        let service = StatisticsService::new(store);
        let summary = service.recent_summary(24).await.unwrap();

        assert_eq!(summary.total_readings, 2);
        let pm25 = &summary.parameters["PM2.5"];
        assert_eq!(pm25.count, 2);
        assert_eq!(pm25.average, 15.0);
        assert_eq!(pm25.maximum, 20.0);
        let no2 = &summary.parameters["NO2"];
        assert_eq!(no2.count, 1);
        assert_eq!(no2.maximum, 30.0);
    }

    #[tokio::test]
    async fn non_numeric_values_are_excluded_from_aggregates() {
        let store = Arc::new(InMemoryReadingStore::new());
        let now = Utc::now();
        let mut params = Map::new();
        params.insert("PM10".to_string(), json!("offline"));
        params.insert("SO2".to_string(), json!(8.0));
        store
            .insert(Reading {
                id: None,
                latitude: 41.0,
                longitude: 29.0,
                timestamp: (now - Duration::hours(1)).to_rfc3339(),
                parameters: params,
            })
            .await
            .unwrap();

        let service = StatisticsService::new(store);
        let summary = service.recent_summary(24).await.unwrap();
        assert!(!summary.parameters.contains_key("PM10"));
        assert_eq!(summary.parameters["SO2"].count, 1);
    }
}
