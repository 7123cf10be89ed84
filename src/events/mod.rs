use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AnomalyKind, Pollutant, Severity};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Ingestion events
    ReadingQueued {
        source_id: Option<String>,
    },
    ReadingRejected {
        reason: String,
    },

    // Processing events
    ReadingStored {
        reading_id: Uuid,
        parameter_count: usize,
        history_size: usize,
    },
    AnomalyDetected {
        alert_id: Uuid,
        kind: AnomalyKind,
        parameter: Pollutant,
        severity: Severity,
    },

    // Notification events
    AlertPersisted(Uuid),
    AlertBroadcast {
        alert_id: Uuid,
        subscribers: usize,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Process incoming events. The loop is observability glue: detection results
// already travel through the queue, so handlers here only log.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ReadingQueued { source_id } => {
                info!(
                    source_id = source_id.as_deref().unwrap_or("unknown"),
                    "Reading accepted and queued"
                );
            }
            Event::ReadingRejected { reason } => {
                warn!(reason = %reason, "Reading rejected at ingestion");
            }
            Event::ReadingStored {
                reading_id,
                parameter_count,
                history_size,
            } => {
                info!(
                    reading_id = %reading_id,
                    parameter_count,
                    history_size,
                    "Reading processed and stored"
                );
            }
            Event::AnomalyDetected {
                alert_id,
                kind,
                parameter,
                severity,
            } => match severity {
                Severity::Danger => warn!(
                    alert_id = %alert_id,
                    kind = %kind,
                    parameter = %parameter,
                    "Danger-level anomaly detected"
                ),
                Severity::Warning => info!(
                    alert_id = %alert_id,
                    kind = %kind,
                    parameter = %parameter,
                    "Anomaly detected"
                ),
            },
            Event::AlertPersisted(alert_id) => {
                info!(alert_id = %alert_id, "Alert persisted");
            }
            Event::AlertBroadcast {
                alert_id,
                subscribers,
            } => {
                info!(alert_id = %alert_id, subscribers, "Alert broadcast to subscribers");
            }
            Event::Generic { message, .. } => {
                info!("Event: {}", message);
            }
        }
    }

    warn!("Event processing loop has ended");
}
