pub mod anomalies;
pub mod readings;
pub mod statistics;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::message_queue::MessageQueue;
use crate::services::ingestion::IngestionService;
use crate::services::notifications::NotificationService;
use crate::services::statistics::StatisticsService;
use crate::store::{AnomalyStore, ReadingStore};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub ingestion: Arc<IngestionService>,
    pub notifications: Arc<NotificationService>,
    pub statistics: Arc<StatisticsService>,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        queue: Arc<dyn MessageQueue>,
        reading_store: Arc<dyn ReadingStore>,
        anomaly_store: Arc<dyn AnomalyStore>,
        event_sender: EventSender,
    ) -> Self {
        let ingestion = Arc::new(IngestionService::new(queue.clone(), event_sender.clone()));
        let notifications = Arc::new(NotificationService::new(
            queue,
            anomaly_store,
            event_sender,
            config.broadcast_capacity,
        ));
        let statistics = Arc::new(StatisticsService::new(reading_store));

        Self {
            ingestion,
            notifications,
            statistics,
        }
    }
}

/// Clamps a requested page size to the configured maximum, falling back to
/// the default when absent.
pub(crate) fn effective_limit(requested: Option<u32>, config: &AppConfig) -> usize {
    requested
        .unwrap_or(config.api_default_page_size)
        .min(config.api_max_page_size) as usize
}
