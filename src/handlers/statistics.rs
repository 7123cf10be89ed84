use axum::{extract::State, response::Json};

use crate::errors::ServiceError;
use crate::services::statistics::RecentStatistics;
use crate::{ApiResponse, AppState};

/// Aggregated pollution statistics for the recent period
#[utoipa::path(
    get,
    path = "/api/v1/statistics/recent",
    summary = "Recent statistics",
    description = "Per-pollutant count, average and maximum over the trailing reporting period",
    responses(
        (status = 200, description = "Statistics computed", body = ApiResponse<RecentStatistics>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn recent_statistics(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RecentStatistics>>, ServiceError> {
    let summary = state
        .services
        .statistics
        .recent_summary(state.config.statistics_hours)
        .await?;

    Ok(Json(ApiResponse::success(summary)))
}
