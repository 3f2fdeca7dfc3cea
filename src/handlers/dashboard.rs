use axum::{
    extract::{Query, State},
    response::Json,
};

use super::OrderQuery;
use crate::models::StatisticsReport;
use crate::{ApiResponse, ApiResult, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/admin/dashboard/statistics",
    summary = "Dashboard statistics",
    description = "Aggregates the orders matching the filters together with the email log for the same period",
    params(OrderQuery),
    responses(
        (status = 200, description = "Statistics computed", body = ApiResponse<StatisticsReport>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "dashboard"
)]
pub async fn statistics(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<StatisticsReport> {
    let filter = query.into_filter()?;
    let report = state.services.statistics.report(&filter).await?;
    Ok(Json(ApiResponse::success(report)))
}
