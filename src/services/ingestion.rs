//! Ingestion boundary: structural validation and hand-off to the queue.
//!
//! Everything the detection engine is allowed to assume about a reading is
//! enforced here (coordinate ranges, registered pollutant codes, numeric
//! non-negative values) so the engine itself only ever re-checks numeric
//! parseability per field.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::message_queue::{Message, MessageQueue, READINGS_TOPIC};
use crate::models::reading::{parse_timestamp, parse_value};
use crate::models::{Pollutant, Reading};

const VALID_CODES: &str = "PM2.5, PM10, NO2, SO2, O3";

/// A reading as submitted over HTTP. The timestamp is optional and stamped
/// with "now" when missing, matching station firmware that omits it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitReadingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Per-item outcome of a batch submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemResult {
    pub data_id: String,
    pub status: String,
    pub message: String,
}

/// Validates submitted readings and publishes the accepted ones.
#[derive(Clone)]
pub struct IngestionService {
    queue: Arc<dyn MessageQueue>,
    event_sender: EventSender,
}

impl IngestionService {
    pub fn new(queue: Arc<dyn MessageQueue>, event_sender: EventSender) -> Self {
        Self {
            queue,
            event_sender,
        }
    }

    /// Validates and enqueues one reading; returns its submitted identifier.
    #[instrument(skip(self, request), fields(source_id = request.id.as_deref().unwrap_or("unknown")))]
    pub async fn submit(&self, request: SubmitReadingRequest) -> Result<String, ServiceError> {
        let reading = match validate_reading(request) {
            Ok(reading) => reading,
            Err(err) => {
                if let Err(send_err) = self
                    .event_sender
                    .send(Event::ReadingRejected {
                        reason: err.to_string(),
                    })
                    .await
                {
                    warn!(error = %send_err, "Failed to send reading rejected event");
                }
                return Err(err);
            }
        };

        let data_id = reading.id.clone().unwrap_or_else(|| "unknown".to_string());
        let payload = serde_json::to_value(&reading)?;
        self.queue
            .publish(Message::new(READINGS_TOPIC.to_string(), payload))
            .await?;

        info!(data_id = %data_id, "Reading received and queued");
        if let Err(err) = self
            .event_sender
            .send(Event::ReadingQueued {
                source_id: reading.id.clone(),
            })
            .await
        {
            warn!(error = %err, "Failed to send reading queued event");
        }

        Ok(data_id)
    }

    /// Validates and enqueues a batch, one result per item; a bad item never
    /// fails its siblings.
    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    pub async fn submit_batch(&self, batch: Vec<SubmitReadingRequest>) -> Vec<BatchItemResult> {
        let mut results = Vec::with_capacity(batch.len());

        for request in batch {
            let data_id = request.id.clone().unwrap_or_else(|| "unknown".to_string());
            let result = match self.submit(request).await {
                Ok(_) => BatchItemResult {
                    data_id,
                    status: "success".to_string(),
                    message: "Data is valid".to_string(),
                },
                Err(err) => BatchItemResult {
                    data_id,
                    status: "error".to_string(),
                    message: err.response_message(),
                },
            };
            results.push(result);
        }

        results
    }
}

/// Structural validation: everything downstream of the queue assumes these
/// invariants hold.
pub fn validate_reading(request: SubmitReadingRequest) -> Result<Reading, ServiceError> {
    if !(-90.0..=90.0).contains(&request.latitude) {
        return Err(ServiceError::ValidationError(
            "Invalid latitude (must be between -90 and 90)".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&request.longitude) {
        return Err(ServiceError::ValidationError(
            "Invalid longitude (must be between -180 and 180)".to_string(),
        ));
    }

    if request.parameters.is_empty() {
        return Err(ServiceError::ValidationError(
            "Parameters must be a non-empty map".to_string(),
        ));
    }
    for (code, raw) in &request.parameters {
        if Pollutant::from_code(code).is_none() {
            return Err(ServiceError::ValidationError(format!(
                "Invalid parameter: {code}. Valid: {VALID_CODES}"
            )));
        }
        let Some(value) = parse_value(raw) else {
            return Err(ServiceError::ValidationError(format!(
                "Parameter value must be numeric: {code}"
            )));
        };
        if value < 0.0 {
            return Err(ServiceError::ValidationError(format!(
                "Parameter value cannot be negative: {code}"
            )));
        }
    }

    let timestamp = match request.timestamp {
        Some(raw) => {
            if parse_timestamp(&raw).is_none() {
                return Err(ServiceError::ValidationError(format!(
                    "Invalid timestamp: {raw}"
                )));
            }
            raw
        }
        None => Utc::now().to_rfc3339(),
    };

    Ok(Reading {
        id: request.id,
        latitude: request.latitude,
        longitude: request.longitude,
        timestamp,
        parameters: request.parameters,
    })
}
