/*!
 * # Reading and Anomaly Stores
 *
 * The historical store answers exactly the two query shapes the detection
 * pipeline needs: "same-location, time-bounded" (bounding box) and
 * "radius-bounded, time-bounded". Retention and durable persistence are
 * deliberately out of scope; the in-memory backends are the only ones shipped
 * and the traits are the seam for anything heavier.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{AnomalyAlert, AnomalyKind, Pollutant, Reading, Severity};
use crate::services::geo::haversine_km;

/// Inclusive time range used by every time-bounded query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// A reading as persisted: the raw observation plus the store's own identity
/// and the parsed observation instant (None when the station timestamp did
/// not parse; such entries never match time-bounded queries).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredReading {
    pub id: Uuid,
    pub reading: Reading,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Filters for the reading listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub range: Option<TimeRange>,
    pub center: Option<(f64, f64)>,
    pub radius_km: Option<f64>,
    pub parameter: Option<Pollutant>,
    pub limit: usize,
    pub offset: usize,
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert(&self, reading: Reading) -> Result<StoredReading, ServiceError>;

    /// Same-location query: readings inside a square bounding box of
    /// `half_side_degrees` around the center, newest first, capped at `limit`.
    async fn query_bounding_box(
        &self,
        latitude: f64,
        longitude: f64,
        half_side_degrees: f64,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<StoredReading>, ServiceError>;

    /// Radius query: readings within `radius_km` (great-circle) of the
    /// center, newest first, capped at `limit`.
    async fn query_radius(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<StoredReading>, ServiceError>;

    /// General listing with optional filters, newest first.
    async fn list(&self, filter: ReadingFilter) -> Result<(Vec<StoredReading>, usize), ServiceError>;

    async fn count(&self) -> Result<usize, ServiceError>;
}

/// Filters for the anomaly listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub range: Option<TimeRange>,
    pub severity: Option<Severity>,
    pub kind: Option<AnomalyKind>,
    pub parameter: Option<Pollutant>,
    pub limit: usize,
    pub offset: usize,
}

#[async_trait]
pub trait AnomalyStore: Send + Sync {
    async fn insert(&self, alert: AnomalyAlert) -> Result<(), ServiceError>;
    async fn list(&self, filter: AnomalyFilter) -> Result<(Vec<AnomalyAlert>, usize), ServiceError>;
    async fn count(&self) -> Result<usize, ServiceError>;
}

/// DashMap-backed reading store.
#[derive(Debug, Default)]
pub struct InMemoryReadingStore {
    readings: DashMap<Uuid, StoredReading>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Vec<StoredReading> {
        self.readings.iter().map(|entry| entry.value().clone()).collect()
    }
}

fn sort_newest_first(readings: &mut [StoredReading]) {
    readings.sort_by(|a, b| {
        let a_at = a.observed_at.unwrap_or(a.received_at);
        let b_at = b.observed_at.unwrap_or(b.received_at);
        b_at.cmp(&a_at).then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn insert(&self, reading: Reading) -> Result<StoredReading, ServiceError> {
        let observed_at = reading.parsed_timestamp();
        let stored = StoredReading {
            id: Uuid::new_v4(),
            reading,
            received_at: Utc::now(),
            observed_at,
        };
        self.readings.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn query_bounding_box(
        &self,
        latitude: f64,
        longitude: f64,
        half_side_degrees: f64,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<StoredReading>, ServiceError> {
        let mut matches: Vec<StoredReading> = self
            .snapshot()
            .into_iter()
            .filter(|stored| {
                stored.observed_at.map_or(false, |at| range.contains(at))
                    && (stored.reading.latitude - latitude).abs() <= half_side_degrees
                    && (stored.reading.longitude - longitude).abs() <= half_side_degrees
            })
            .collect();
        sort_newest_first(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn query_radius(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<StoredReading>, ServiceError> {
        let mut matches: Vec<StoredReading> = self
            .snapshot()
            .into_iter()
            .filter(|stored| {
                stored.observed_at.map_or(false, |at| range.contains(at))
                    && haversine_km(
                        latitude,
                        longitude,
                        stored.reading.latitude,
                        stored.reading.longitude,
                    ) <= radius_km
            })
            .collect();
        sort_newest_first(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn list(&self, filter: ReadingFilter) -> Result<(Vec<StoredReading>, usize), ServiceError> {
        let mut matches: Vec<StoredReading> = self
            .snapshot()
            .into_iter()
            .filter(|stored| {
                if let Some(range) = filter.range {
                    if !stored.observed_at.map_or(false, |at| range.contains(at)) {
                        return false;
                    }
                }
                if let (Some((lat, lon)), Some(radius)) = (filter.center, filter.radius_km) {
                    if haversine_km(lat, lon, stored.reading.latitude, stored.reading.longitude)
                        > radius
                    {
                        return false;
                    }
                }
                if let Some(parameter) = filter.parameter {
                    if !stored
                        .reading
                        .parameters
                        .contains_key(&parameter.to_string())
                    {
                        return false;
                    }
                }
                true
            })
            .collect();

        sort_newest_first(&mut matches);
        let total = matches.len();
        let page: Vec<StoredReading> = matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        Ok((page, total))
    }

    async fn count(&self) -> Result<usize, ServiceError> {
        Ok(self.readings.len())
    }
}

/// DashMap-backed anomaly store.
#[derive(Debug, Default)]
pub struct InMemoryAnomalyStore {
    alerts: DashMap<Uuid, AnomalyAlert>,
}

impl InMemoryAnomalyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnomalyStore for InMemoryAnomalyStore {
    async fn insert(&self, alert: AnomalyAlert) -> Result<(), ServiceError> {
        self.alerts.insert(alert.id, alert);
        Ok(())
    }

    async fn list(&self, filter: AnomalyFilter) -> Result<(Vec<AnomalyAlert>, usize), ServiceError> {
        let mut matches: Vec<AnomalyAlert> = self
            .alerts
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|alert| {
                if let Some(range) = filter.range {
                    if !range.contains(alert.detected_at) {
                        return false;
                    }
                }
                if let Some(severity) = filter.severity {
                    if alert.record.severity != severity {
                        return false;
                    }
                }
                if let Some(kind) = filter.kind {
                    if alert.record.kind != kind {
                        return false;
                    }
                }
                if let Some(parameter) = filter.parameter {
                    if alert.record.parameter != parameter {
                        return false;
                    }
                }
                true
            })
            .collect();

        matches.sort_by(|a, b| b.detected_at.cmp(&a.detected_at).then_with(|| a.id.cmp(&b.id)));
        let total = matches.len();
        let page: Vec<AnomalyAlert> = matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        Ok((page, total))
    }

    async fn count(&self) -> Result<usize, ServiceError> {
        Ok(self.alerts.len())
    }
}
