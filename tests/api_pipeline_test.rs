//! Router-level tests of the ingest → detect → notify pipeline, driven
//! through the public HTTP surface with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use airsense_api as api;

struct TestApp {
    router: Router,
}

impl TestApp {
    /// Wires the full service graph the way `main` does, with the background
    /// consumer tasks running.
    fn spawn() -> Self {
        let cfg = api::config::AppConfig::default();

        let reading_store: Arc<dyn api::store::ReadingStore> =
            Arc::new(api::store::InMemoryReadingStore::new());
        let anomaly_store: Arc<dyn api::store::AnomalyStore> =
            Arc::new(api::store::InMemoryAnomalyStore::new());
        let queue: Arc<dyn api::message_queue::MessageQueue> =
            Arc::new(api::message_queue::InMemoryMessageQueue::new());

        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = api::events::EventSender::new(event_tx);
        tokio::spawn(api::events::process_events(event_rx));

        let engine =
            api::services::detection::DetectionEngine::from_config(cfg.detection.clone());
        let services = api::handlers::AppServices::new(
            &cfg,
            queue.clone(),
            reading_store.clone(),
            anomaly_store.clone(),
            event_sender.clone(),
        );

        let processing = Arc::new(api::services::processing::ProcessingService::new(
            queue.clone(),
            reading_store.clone(),
            engine,
            event_sender.clone(),
        ));
        tokio::spawn(processing.run());
        tokio::spawn(services.notifications.clone().run());

        let state = api::AppState {
            config: cfg,
            event_sender,
            services,
            reading_store,
            anomaly_store,
            queue,
        };

        let router = Router::new()
            .route("/", get(|| async { "airsense-api up" }))
            .nest("/api/v1", api::api_v1_routes())
            .with_state(state);

        Self { router }
    }

    async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(payload) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Polls the anomalies endpoint until `expected` alerts are visible or a
    /// timeout elapses, returning the final listing.
    async fn wait_for_anomalies(&self, expected: usize) -> Value {
        for _ in 0..100 {
            let (status, body) = self.request("GET", "/api/v1/anomalies", None).await;
            assert_eq!(status, StatusCode::OK);
            if body["data"]["total"].as_u64() == Some(expected as u64) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("expected {expected} anomalies to become visible");
    }
}

fn valid_reading(params: Value) -> Value {
    json!({
        "id": "station-7",
        "latitude": 41.01,
        "longitude": 28.96,
        "timestamp": "2024-03-01T12:00:00Z",
        "parameters": params,
    })
}

#[tokio::test]
async fn submitting_a_valid_reading_returns_accepted() {
    let app = TestApp::spawn();

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/pollution/data",
            Some(valid_reading(json!({"PM2.5": 5.0}))),
        )
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["data_id"], "station-7");
}

#[tokio::test]
async fn invalid_readings_are_rejected_with_details() {
    let app = TestApp::spawn();

    let mut bad_coords = valid_reading(json!({"PM2.5": 5.0}));
    bad_coords["latitude"] = json!(123.0);
    let (status, body) = app
        .request("POST", "/api/v1/pollution/data", Some(bad_coords))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("latitude"));

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/pollution/data",
            Some(valid_reading(json!({"CO": 5.0}))),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Invalid parameter: CO"));
}

#[tokio::test]
async fn batch_submission_reports_per_item_results() {
    let app = TestApp::spawn();

    let batch = json!([
        valid_reading(json!({"PM2.5": 5.0})),
        {
            "id": "broken",
            "latitude": 41.0,
            "longitude": 29.0,
            "parameters": {"XYZ": 1.0}
        }
    ]);
    let (status, body) = app
        .request("POST", "/api/v1/pollution/batch", Some(batch))
        .await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["results"][0]["status"], "success");
    assert_eq!(body["results"][1]["status"], "error");
    assert_eq!(body["results"][1]["data_id"], "broken");
}

#[tokio::test]
async fn dangerous_reading_flows_through_to_the_anomaly_listing() {
    let app = TestApp::spawn();

    // PM2.5 far beyond the dangerous threshold (30)
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/pollution/data",
            Some(valid_reading(json!({"PM2.5": 95.0}))),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let listing = app.wait_for_anomalies(1).await;
    let alert = &listing["data"]["items"][0];
    assert_eq!(alert["record"]["type"], "threshold_exceeded");
    assert_eq!(alert["record"]["parameter"], "PM2.5");
    assert_eq!(alert["record"]["severity"], "danger");
    assert_eq!(alert["reading"]["id"], "station-7");
}

#[tokio::test]
async fn anomaly_listing_filters_by_severity() {
    let app = TestApp::spawn();

    // One danger (PM2.5 95 > 30) and one warning (NO2 30 in (25, 50])
    app.request(
        "POST",
        "/api/v1/pollution/data",
        Some(valid_reading(json!({"PM2.5": 95.0, "NO2": 30.0}))),
    )
    .await;
    app.wait_for_anomalies(2).await;

    let (status, body) = app
        .request("GET", "/api/v1/anomalies?severity=danger", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["record"]["parameter"], "PM2.5");

    let (status, body) = app
        .request("GET", "/api/v1/anomalies?severity=catastrophic", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("severity"));
}

#[tokio::test]
async fn processed_readings_become_listable() {
    let app = TestApp::spawn();

    app.request(
        "POST",
        "/api/v1/pollution/data",
        Some(valid_reading(json!({"NO2": 12.0}))),
    )
    .await;

    // Clean readings publish no alert, so poll the readings listing instead
    for _ in 0..100 {
        let (status, body) = app.request("GET", "/api/v1/pollution/data", None).await;
        assert_eq!(status, StatusCode::OK);
        if body["data"]["total"].as_u64() == Some(1) {
            let item = &body["data"]["items"][0];
            assert_eq!(item["reading"]["id"], "station-7");
            assert_eq!(item["reading"]["parameters"]["NO2"], 12.0);
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("reading never became visible in the listing");
}

#[tokio::test]
async fn statistics_reflect_processed_readings() {
    let app = TestApp::spawn();

    let mut reading = valid_reading(json!({"PM2.5": 10.0}));
    reading["timestamp"] = json!(chrono::Utc::now().to_rfc3339());
    app.request("POST", "/api/v1/pollution/data", Some(reading))
        .await;

    for _ in 0..100 {
        let (status, body) = app.request("GET", "/api/v1/statistics/recent", None).await;
        assert_eq!(status, StatusCode::OK);
        if body["data"]["total_readings"].as_u64() == Some(1) {
            assert_eq!(body["data"]["parameters"]["PM2.5"]["count"], 1);
            assert_eq!(body["data"]["parameters"]["PM2.5"]["average"], 10.0);
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("statistics never reflected the reading");
}

#[tokio::test]
async fn health_and_status_endpoints_respond() {
    let app = TestApp::spawn();

    let (status, body) = app.request("GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["checks"]["message_queue"], "healthy");

    let (status, body) = app.request("GET", "/api/v1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"], "airsense-api");
}
