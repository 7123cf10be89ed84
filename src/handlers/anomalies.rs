use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::{AnomalyAlert, AnomalyKind, Severity};
use crate::store::AnomalyFilter;
use crate::{ApiResponse, AppState};

use super::readings::{parse_pollutant, parse_range};

#[derive(Debug, Serialize, ToSchema)]
pub struct AnomalyListResponse {
    pub items: Vec<AnomalyAlert>,
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
}

#[derive(Debug, Deserialize)]
pub struct AnomalyListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub severity: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub parameter: Option<String>,
    pub limit: Option<u32>,
    pub skip: Option<usize>,
}

/// Lists detected anomalies with optional filters
#[utoipa::path(
    get,
    path = "/api/v1/anomalies",
    summary = "List anomalies",
    description = "Stored anomaly alerts, newest first, with optional filters",
    params(
        ("start_date" = Option<String>, Query, description = "ISO-8601 lower bound on detection time"),
        ("end_date" = Option<String>, Query, description = "ISO-8601 upper bound on detection time"),
        ("severity" = Option<String>, Query, description = "warning or danger"),
        ("type" = Option<String>, Query, description = "threshold_exceeded, statistical_anomaly or regional_anomaly"),
        ("parameter" = Option<String>, Query, description = "Pollutant code filter"),
        ("limit" = Option<u32>, Query, description = "Page size"),
        ("skip" = Option<usize>, Query, description = "Offset"),
    ),
    responses(
        (status = 200, description = "Anomalies retrieved", body = ApiResponse<AnomalyListResponse>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_anomalies(
    State(state): State<AppState>,
    Query(query): Query<AnomalyListQuery>,
) -> Result<Json<ApiResponse<AnomalyListResponse>>, ServiceError> {
    let range = parse_range(query.start_date.as_deref(), query.end_date.as_deref())?;
    let parameter = parse_pollutant(query.parameter.as_deref())?;

    let severity = match query.severity.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<Severity>().map_err(|_| {
            ServiceError::InvalidInput(format!("Unknown severity: {raw}"))
        })?),
    };
    let kind = match query.kind.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<AnomalyKind>().map_err(|_| {
            ServiceError::InvalidInput(format!("Unknown anomaly type: {raw}"))
        })?),
    };

    let limit = crate::handlers::effective_limit(query.limit, &state.config);
    let skip = query.skip.unwrap_or(0);

    let (items, total) = state
        .services
        .notifications
        .list(AnomalyFilter {
            range,
            severity,
            kind,
            parameter,
            limit,
            offset: skip,
        })
        .await?;

    Ok(Json(ApiResponse::success(AnomalyListResponse {
        items,
        total,
        limit,
        skip,
    })))
}
