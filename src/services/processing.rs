//! Processing pipeline: queue consumer, historical window assembly, engine
//! invocation, persistence, and alert publication.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{error, info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::message_queue::{Message, MessageQueue, ANOMALIES_TOPIC, READINGS_TOPIC};
use crate::models::{AnomalyAlert, Reading};
use crate::services::detection::DetectionEngine;
use crate::store::{ReadingStore, TimeRange};

const IDLE_POLL_INTERVAL: StdDuration = StdDuration::from_millis(250);
const ERROR_BACKOFF: StdDuration = StdDuration::from_secs(5);

/// Consumes validated readings, runs the detection engine against the
/// historical window, stores the reading, and publishes one alert per
/// finding. Detection itself is pure; all I/O lives here.
pub struct ProcessingService {
    queue: Arc<dyn MessageQueue>,
    reading_store: Arc<dyn ReadingStore>,
    engine: DetectionEngine,
    event_sender: EventSender,
}

impl ProcessingService {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        reading_store: Arc<dyn ReadingStore>,
        engine: DetectionEngine,
        event_sender: EventSender,
    ) -> Self {
        Self {
            queue,
            reading_store,
            engine,
            event_sender,
        }
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    /// Long-running consumer loop. One reading at a time, in arrival order;
    /// failures back off instead of tearing the task down.
    pub async fn run(self: Arc<Self>) {
        info!("Listening to pollution readings queue");

        loop {
            match self.queue.subscribe(READINGS_TOPIC).await {
                Ok(Some(message)) => self.handle_message(message).await,
                Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                Err(err) => {
                    error!(error = %err, "Queue consumer error, backing off");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn handle_message(&self, message: Message) {
        let reading: Reading = match serde_json::from_value(message.payload) {
            Ok(reading) => reading,
            Err(err) => {
                // Malformed payloads are dropped: the ingestion boundary is
                // the validator, and requeueing garbage would loop forever.
                warn!(message_id = %message.id, error = %err, "Dropping malformed queue message");
                return;
            }
        };

        if let Err(err) = self.process_reading(reading).await {
            error!(message_id = %message.id, error = %err, "Failed to process reading");
        }
    }

    /// Full pipeline for one reading. Returns the number of alerts published.
    #[instrument(skip(self, reading), fields(source_id = reading.id.as_deref().unwrap_or("unknown")))]
    pub async fn process_reading(&self, reading: Reading) -> Result<usize, ServiceError> {
        let history = self.assemble_window(&reading).await?;
        let records = self.engine.evaluate(&reading, &history);

        let stored = self.reading_store.insert(reading.clone()).await?;
        if let Err(err) = self
            .event_sender
            .send(Event::ReadingStored {
                reading_id: stored.id,
                parameter_count: reading.parameters.len(),
                history_size: history.len(),
            })
            .await
        {
            warn!(error = %err, "Failed to send reading stored event");
        }

        let published = records.len();
        for record in records {
            let alert = AnomalyAlert::new(reading.clone(), record);
            let payload = serde_json::to_value(&alert)?;
            self.queue
                .publish(Message::new(ANOMALIES_TOPIC.to_string(), payload))
                .await?;

            info!(
                alert_id = %alert.id,
                kind = %alert.record.kind,
                "Detected anomaly and published"
            );
            if let Err(err) = self
                .event_sender
                .send(Event::AnomalyDetected {
                    alert_id: alert.id,
                    kind: alert.record.kind,
                    parameter: alert.record.parameter,
                    severity: alert.record.severity,
                })
                .await
            {
                warn!(error = %err, "Failed to send anomaly detected event");
            }
        }

        Ok(published)
    }

    /// Builds the engine's historical window from the store using both query
    /// shapes (same-location/24 h for the statistical detector, radius/6 h
    /// for the regional one), merged and deduplicated. The window
    /// is capped so a dense region cannot make a single evaluation unbounded.
    async fn assemble_window(&self, reading: &Reading) -> Result<Vec<Reading>, ServiceError> {
        let config = self.engine.config();
        let anchor = reading.parsed_timestamp().unwrap_or_else(Utc::now);

        let statistical_range = TimeRange::new(
            anchor - Duration::hours(config.statistical_window_hours),
            anchor,
        );
        let regional_range = TimeRange::new(
            anchor - Duration::hours(config.regional_window_hours),
            anchor,
        );

        let local = self
            .reading_store
            .query_bounding_box(
                reading.latitude,
                reading.longitude,
                config.statistical_bbox_degrees,
                statistical_range,
                config.max_history_points,
            )
            .await?;
        let regional = self
            .reading_store
            .query_radius(
                reading.latitude,
                reading.longitude,
                config.regional_radius_km,
                regional_range,
                config.max_history_points,
            )
            .await?;

        let mut seen = HashSet::new();
        let mut window = Vec::with_capacity(local.len() + regional.len());
        for stored in local.into_iter().chain(regional) {
            if seen.insert(stored.id) {
                window.push(stored.reading);
            }
            if window.len() >= config.max_history_points {
                break;
            }
        }

        Ok(window)
    }
}
