use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::info;
use uuid::Uuid;

use super::{ExportQuery, OrderQuery};
use crate::errors::ServiceError;
use crate::models::{EmailLogEntry, Order};
use crate::services::orders::{
    BudgetEmailRequest, BudgetEmailResult, StatusChange, UpdateOrderStatusRequest,
};
use crate::{ApiResponse, ApiResult, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    summary = "List orders",
    description = "Orders matching every given filter, newest first",
    params(OrderQuery),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<Vec<Order>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<Vec<Order>> {
    let filter = query.into_filter()?;
    let orders = state.services.orders.list(&filter).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/export",
    summary = "Export orders",
    description = "Orders matching the filters as a CSV or JSON download named orders-export-YYYY-MM-DD",
    params(ExportQuery),
    responses(
        (status = 200, description = "Export file",
            content(
                (String = "text/csv"),
                (Vec<crate::services::export::ExportRow> = "application/json")
            )
        ),
        (status = 400, description = "Unknown format or invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn export_orders(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ServiceError> {
    let (format, filter) = query.into_parts()?;
    let file = state.services.orders.export(&filter, format).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.body,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<Order>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Order> {
    let order = state.services.orders.get(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    summary = "Update order status",
    description = "Moves the order along its lifecycle and optionally emails the customer",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<StatusChange>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<StatusChange> {
    let change = state.services.orders.update_status(id, request).await?;
    Ok(Json(ApiResponse::success(change)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/orders/{id}",
    summary = "Delete order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.orders.delete(id).await?;
    info!(order_id = %id, "order deleted from backoffice");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/budget-email",
    summary = "Send budget email",
    description = "Emails the budget to the customer or to the given recipient, numbering the budget on first send",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = BudgetEmailRequest,
    responses(
        (status = 200, description = "Budget sent", body = ApiResponse<BudgetEmailResult>),
        (status = 400, description = "No recipient available", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Email endpoint rejected the message", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn send_budget_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<BudgetEmailRequest>,
) -> ApiResult<BudgetEmailResult> {
    let result = state.services.orders.send_budget_email(id, request).await?;
    Ok(Json(ApiResponse::success(result)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}/emails",
    summary = "Order email history",
    description = "Every email sent or attempted for the order, newest first",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Email history", body = ApiResponse<Vec<EmailLogEntry>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn order_emails(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<EmailLogEntry>> {
    let history = state.services.orders.email_history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}
