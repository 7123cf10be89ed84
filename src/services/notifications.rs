//! Notification fan-out: consumes anomaly alerts, persists them, and
//! broadcasts to live subscribers. The broadcast channel is the seam any
//! push transport would attach to; delivery guarantees beyond "best effort
//! to currently connected subscribers" are explicitly not this service's
//! concern.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::message_queue::{Message, MessageQueue, ANOMALIES_TOPIC};
use crate::models::AnomalyAlert;
use crate::store::{AnomalyFilter, AnomalyStore};

const IDLE_POLL_INTERVAL: StdDuration = StdDuration::from_millis(250);
const ERROR_BACKOFF: StdDuration = StdDuration::from_secs(5);

pub struct NotificationService {
    queue: Arc<dyn MessageQueue>,
    anomaly_store: Arc<dyn AnomalyStore>,
    broadcaster: broadcast::Sender<AnomalyAlert>,
    event_sender: EventSender,
}

impl NotificationService {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        anomaly_store: Arc<dyn AnomalyStore>,
        event_sender: EventSender,
        broadcast_capacity: usize,
    ) -> Self {
        let (broadcaster, _) = broadcast::channel(broadcast_capacity);
        Self {
            queue,
            anomaly_store,
            broadcaster,
            event_sender,
        }
    }

    /// New live subscription; each subscriber sees every alert from the
    /// moment it subscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<AnomalyAlert> {
        self.broadcaster.subscribe()
    }

    /// Long-running consumer loop over the anomalies topic.
    pub async fn run(self: Arc<Self>) {
        info!("Listening for anomalies on the queue");

        loop {
            match self.queue.subscribe(ANOMALIES_TOPIC).await {
                Ok(Some(message)) => self.handle_message(message).await,
                Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                Err(err) => {
                    error!(error = %err, "Anomaly consumer error, backing off");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn handle_message(&self, message: Message) {
        let alert: AnomalyAlert = match serde_json::from_value(message.payload) {
            Ok(alert) => alert,
            Err(err) => {
                warn!(message_id = %message.id, error = %err, "Dropping malformed alert message");
                return;
            }
        };

        if let Err(err) = self.handle_alert(alert).await {
            error!(message_id = %message.id, error = %err, "Failed to process alert");
        }
    }

    /// Persists one alert and pushes it to live subscribers.
    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    pub async fn handle_alert(&self, alert: AnomalyAlert) -> Result<(), ServiceError> {
        self.anomaly_store.insert(alert.clone()).await?;
        if let Err(err) = self.event_sender.send(Event::AlertPersisted(alert.id)).await {
            warn!(error = %err, "Failed to send alert persisted event");
        }

        let subscribers = self.broadcaster.receiver_count();
        if subscribers > 0 {
            // Err here only means every subscriber disconnected mid-send
            let _ = self.broadcaster.send(alert.clone());
        }
        info!(subscribers, severity = %alert.record.severity, "Anomaly notification broadcast");
        if let Err(err) = self
            .event_sender
            .send(Event::AlertBroadcast {
                alert_id: alert.id,
                subscribers,
            })
            .await
        {
            warn!(error = %err, "Failed to send alert broadcast event");
        }

        Ok(())
    }

    /// Stored alerts matching the filter, newest first, plus the total match
    /// count before pagination.
    pub async fn list(
        &self,
        filter: AnomalyFilter,
    ) -> Result<(Vec<AnomalyAlert>, usize), ServiceError> {
        self.anomaly_store.list(filter).await
    }
}
