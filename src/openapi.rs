use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AirSense API",
        version = "0.1.0",
        description = r#"
# AirSense Air-Quality Monitoring API

Backend for ingesting geotagged air-quality readings and raising alerts when
a reading is abnormal.

## Pipeline

Submitted readings are validated at the ingestion boundary, queued, and
evaluated by a deterministic anomaly-detection engine against WHO regulatory
thresholds, the same location's recent history, and the behavior of nearby
stations. Every finding is persisted and fanned out to live subscribers.

## Error Handling

Failing endpoints return a consistent JSON body:

```json
{
  "error": "Bad Request",
  "message": "Validation error: Invalid latitude (must be between -90 and 90)",
  "timestamp": "2024-03-01T12:00:00Z"
}
```

## Pagination

List endpoints accept `limit` and `skip` query parameters and return items
newest first along with the total match count.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Readings", description = "Reading submission and retrieval"),
        (name = "Anomalies", description = "Detected anomaly alerts"),
        (name = "Statistics", description = "Aggregated statistics"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::readings::submit_reading,
        crate::handlers::readings::submit_batch,
        crate::handlers::readings::list_readings,
        crate::handlers::anomalies::list_anomalies,
        crate::handlers::statistics::recent_statistics,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,

            // Domain types
            crate::models::Pollutant,
            crate::models::Reading,
            crate::models::AnomalyKind,
            crate::models::Severity,
            crate::models::AnomalyEvidence,
            crate::models::AnomalyRecord,
            crate::models::AnomalyAlert,
            crate::store::StoredReading,

            // Request/response types
            crate::services::ingestion::SubmitReadingRequest,
            crate::services::ingestion::BatchItemResult,
            crate::services::statistics::PollutantSummary,
            crate::services::statistics::RecentStatistics,
            crate::handlers::readings::SubmitReadingResponse,
            crate::handlers::readings::BatchSubmitResponse,
            crate::handlers::readings::ReadingListResponse,
            crate::handlers::anomalies::AnomalyListResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
