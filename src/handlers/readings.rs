use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::reading::parse_timestamp;
use crate::models::Pollutant;
use crate::services::ingestion::{BatchItemResult, SubmitReadingRequest};
use crate::store::{ReadingFilter, StoredReading, TimeRange};
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitReadingResponse {
    pub data_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchSubmitResponse {
    pub status: String,
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingListResponse {
    pub items: Vec<StoredReading>,
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReadingListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius: Option<f64>,
    pub parameter: Option<String>,
    pub limit: Option<u32>,
    pub skip: Option<usize>,
}

/// Parses an optional `[start, end]` pair into a time range; either bound may
/// be omitted and defaults to the extreme of the axis.
pub(crate) fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<TimeRange>, ServiceError> {
    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    let parse = |raw: &str| {
        parse_timestamp(raw)
            .ok_or_else(|| ServiceError::InvalidInput(format!("Invalid date: {raw}")))
    };
    let start = match start {
        Some(raw) => parse(raw)?,
        None => chrono::DateTime::<chrono::Utc>::MIN_UTC,
    };
    let end = match end {
        Some(raw) => parse(raw)?,
        None => chrono::DateTime::<chrono::Utc>::MAX_UTC,
    };
    Ok(Some(TimeRange::new(start, end)))
}

pub(crate) fn parse_pollutant(raw: Option<&str>) -> Result<Option<Pollutant>, ServiceError> {
    match raw {
        None => Ok(None),
        Some(code) => Pollutant::from_code(code)
            .map(Some)
            .ok_or_else(|| ServiceError::InvalidInput(format!("Unknown parameter: {code}"))),
    }
}

/// Receives a single pollution reading
#[utoipa::path(
    post,
    path = "/api/v1/pollution/data",
    summary = "Submit reading",
    description = "Validate one pollution reading and queue it for anomaly detection",
    request_body = SubmitReadingRequest,
    responses(
        (status = 202, description = "Reading accepted and queued", body = ApiResponse<SubmitReadingResponse>),
        (status = 400, description = "Structural validation failed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn submit_reading(
    State(state): State<AppState>,
    Json(request): Json<SubmitReadingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitReadingResponse>>), ServiceError> {
    let data_id = state.services.ingestion.submit(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(SubmitReadingResponse { data_id })),
    ))
}

/// Receives a batch of pollution readings
#[utoipa::path(
    post,
    path = "/api/v1/pollution/batch",
    summary = "Submit reading batch",
    description = "Validate and queue a batch of readings; items succeed or fail independently",
    request_body = Vec<SubmitReadingRequest>,
    responses(
        (status = 207, description = "Per-item results", body = BatchSubmitResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(batch): Json<Vec<SubmitReadingRequest>>,
) -> (StatusCode, Json<BatchSubmitResponse>) {
    let results = state.services.ingestion.submit_batch(batch).await;

    (
        StatusCode::MULTI_STATUS,
        Json(BatchSubmitResponse {
            status: "completed".to_string(),
            results,
        }),
    )
}

/// Lists stored readings with optional filters
#[utoipa::path(
    get,
    path = "/api/v1/pollution/data",
    summary = "List readings",
    description = "Stored readings, newest first, with optional time/location/parameter filters",
    params(
        ("start_date" = Option<String>, Query, description = "ISO-8601 lower bound"),
        ("end_date" = Option<String>, Query, description = "ISO-8601 upper bound"),
        ("lat" = Option<f64>, Query, description = "Center latitude for radius filter"),
        ("lon" = Option<f64>, Query, description = "Center longitude for radius filter"),
        ("radius" = Option<f64>, Query, description = "Radius in kilometers"),
        ("parameter" = Option<String>, Query, description = "Pollutant code filter"),
        ("limit" = Option<u32>, Query, description = "Page size"),
        ("skip" = Option<usize>, Query, description = "Offset"),
    ),
    responses(
        (status = 200, description = "Readings retrieved", body = ApiResponse<ReadingListResponse>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_readings(
    State(state): State<AppState>,
    Query(query): Query<ReadingListQuery>,
) -> Result<Json<ApiResponse<ReadingListResponse>>, ServiceError> {
    let range = parse_range(query.start_date.as_deref(), query.end_date.as_deref())?;
    let parameter = parse_pollutant(query.parameter.as_deref())?;

    let center = match (query.lat, query.lon, query.radius) {
        (Some(lat), Some(lon), Some(_)) => Some((lat, lon)),
        _ => None,
    };
    let radius_km = center.and_then(|_| query.radius);

    let limit = crate::handlers::effective_limit(query.limit, &state.config);
    let skip = query.skip.unwrap_or(0);

    let (items, total) = state
        .reading_store
        .list(ReadingFilter {
            range,
            center,
            radius_km,
            parameter,
            limit,
            offset: skip,
        })
        .await?;

    Ok(Json(ApiResponse::success(ReadingListResponse {
        items,
        total,
        limit,
        skip,
    })))
}
