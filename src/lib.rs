//! AirSense API Library
//!
//! This crate provides the core functionality for the AirSense air-quality
//! monitoring API: reading ingestion, the anomaly-detection engine, and
//! alert persistence and fan-out.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod message_queue;
pub mod models;
pub mod openapi;
pub mod services;
pub mod store;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::message_queue::{MessageQueue, ANOMALIES_TOPIC, READINGS_TOPIC};
use crate::store::{AnomalyStore, ReadingStore};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub reading_store: Arc<dyn ReadingStore>,
    pub anomaly_store: Arc<dyn AnomalyStore>,
    pub queue: Arc<dyn MessageQueue>,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// Enhanced API routes function
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Readings API
        .route(
            "/pollution/data",
            get(handlers::readings::list_readings)
                .post(handlers::readings::submit_reading),
        )
        .route(
            "/pollution/batch",
            axum::routing::post(handlers::readings::submit_batch),
        )
        // Anomalies API
        .route("/anomalies", get(handlers::anomalies::list_anomalies))
        // Statistics API
        .route(
            "/statistics/recent",
            get(handlers::statistics::recent_statistics),
        )
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "build_time": build_time,
        "service": "airsense-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    // Check store reachability
    let store_status = match state.reading_store.count().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };
    let alerts_status = match state.anomaly_store.count().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    // Check queue reachability and report backlog depths
    let (queue_status, readings_depth, anomalies_depth) = match (
        state.queue.depth(READINGS_TOPIC).await,
        state.queue.depth(ANOMALIES_TOPIC).await,
    ) {
        (Ok(readings), Ok(anomalies)) => ("healthy", readings, anomalies),
        _ => ("unhealthy", 0, 0),
    };

    let healthy = store_status == "healthy" && alerts_status == "healthy" && queue_status == "healthy";
    let health_data = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "checks": {
            "reading_store": store_status,
            "anomaly_store": alerts_status,
            "message_queue": queue_status,
        },
        "queue_depths": {
            "readings": readings_depth,
            "anomalies": anomalies_depth,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
