use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{EmailStyles, EmailTemplate};
use crate::services::email::{sample_order, TemplatePreview, TemplateUpdate};
use crate::{ApiResponse, ApiResult, AppState};

/// Preview against a stored order, or a sample one when no id is given
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct PreviewRequest {
    pub order_id: Option<Uuid>,
}

/// Outcome of deleting a template edit
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TemplateReset {
    pub id: String,
    /// Built-in default now in effect; `None` when a custom template was removed
    pub restored: Option<EmailTemplate>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/email-templates",
    summary = "List email templates",
    responses(
        (status = 200, description = "Templates retrieved", body = ApiResponse<Vec<EmailTemplate>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "email"
)]
pub async fn list_templates(State(state): State<AppState>) -> ApiResult<Vec<EmailTemplate>> {
    let templates = state.services.email.templates().list().await?;
    Ok(Json(ApiResponse::success(templates)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/email-templates/{id}",
    summary = "Get email template",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template retrieved", body = ApiResponse<EmailTemplate>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Template not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "email"
)]
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<EmailTemplate> {
    let template = state.services.email.templates().require(&id).await?;
    Ok(Json(ApiResponse::success(template)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/email-templates/{id}",
    summary = "Save email template",
    description = "Stores an edit of a built-in template or creates a custom one",
    params(("id" = String, Path, description = "Template id")),
    request_body = TemplateUpdate,
    responses(
        (status = 200, description = "Template saved", body = ApiResponse<EmailTemplate>),
        (status = 400, description = "Invalid template", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "email"
)]
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<TemplateUpdate>,
) -> ApiResult<EmailTemplate> {
    let template = state.services.email.templates().save(&id, update).await?;
    Ok(Json(ApiResponse::success(template)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/email-templates/{id}",
    summary = "Reset email template",
    description = "Drops the stored edit; built-in templates return to their default text",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template reset", body = ApiResponse<TemplateReset>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Template not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "email"
)]
pub async fn reset_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TemplateReset> {
    let restored = state.services.email.templates().reset(&id).await?;
    Ok(Json(ApiResponse::success(TemplateReset { id, restored })))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/email-templates/{id}/preview",
    summary = "Preview email template",
    description = "Renders the template and lists the tokens the context could not fill",
    params(("id" = String, Path, description = "Template id")),
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Rendered preview", body = ApiResponse<TemplatePreview>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Template or order not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "email"
)]
pub async fn preview_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<PreviewRequest>>,
) -> ApiResult<TemplatePreview> {
    let order = match request.and_then(|Json(r)| r.order_id) {
        Some(order_id) => state.services.orders.get(order_id).await?,
        None => sample_order(),
    };
    let preview = state.services.email.preview(&id, &order).await?;
    Ok(Json(ApiResponse::success(preview)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/email-styles",
    summary = "Get email styles",
    responses(
        (status = 200, description = "Current styles", body = ApiResponse<EmailStyles>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "email"
)]
pub async fn get_styles(State(state): State<AppState>) -> ApiResult<EmailStyles> {
    let styles = state.services.email.templates().styles().await?;
    Ok(Json(ApiResponse::success(styles)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/email-styles",
    summary = "Save email styles",
    request_body = EmailStyles,
    responses(
        (status = 200, description = "Styles saved", body = ApiResponse<EmailStyles>),
        (status = 400, description = "Invalid styles", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "email"
)]
pub async fn update_styles(
    State(state): State<AppState>,
    Json(styles): Json<EmailStyles>,
) -> ApiResult<EmailStyles> {
    if styles.font_family.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "font_family must not be empty".to_string(),
        ));
    }
    let styles = state.services.email.templates().save_styles(styles).await?;
    Ok(Json(ApiResponse::success(styles)))
}
