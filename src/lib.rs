//! Curtain Quotes API
//!
//! Public quote intake for made-to-measure curtains plus the backoffice that
//! reviews requests, sends budgets and edits the outgoing emails.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod kv_store;
pub mod middleware_helpers;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::middleware_helpers::admin_key::{require_admin_key, AdminKey};
use crate::repositories::OrderStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub services: handlers::AppServices,
    pub order_store: Arc<dyn OrderStore>,
    pub admin_key: AdminKey,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
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

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn validation_errors_response_lists_errors() {
        let response = crate::tracing::scope_request_id(
            crate::tracing::RequestId::new("meta-validation"),
            async { ApiResponse::<()>::validation_errors(vec!["customer.name: required".into()]) },
        )
        .await;

        assert!(!response.success);
        assert_eq!(response.errors.as_deref().map(<[String]>::len), Some(1));
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-validation"));
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Backoffice routes; every one of them sits behind the admin key
fn admin_routes(admin_key: AdminKey) -> Router<AppState> {
    let orders = Router::new()
        .route("/", get(handlers::orders::list_orders))
        .route("/export", get(handlers::orders::export_orders))
        .route(
            "/:id",
            get(handlers::orders::get_order).delete(handlers::orders::delete_order),
        )
        .route("/:id/status", put(handlers::orders::update_order_status))
        .route(
            "/:id/budget-email",
            post(handlers::orders::send_budget_email),
        )
        .route("/:id/emails", get(handlers::orders::order_emails));

    let templates = Router::new()
        .route("/", get(handlers::templates::list_templates))
        .route(
            "/:id",
            get(handlers::templates::get_template)
                .put(handlers::templates::update_template)
                .delete(handlers::templates::reset_template),
        )
        .route("/:id/preview", post(handlers::templates::preview_template));

    Router::new()
        .nest("/orders", orders)
        .route(
            "/dashboard/statistics",
            get(handlers::dashboard::statistics),
        )
        .nest("/email-templates", templates)
        .route(
            "/email-styles",
            get(handlers::templates::get_styles).put(handlers::templates::update_styles),
        )
        .route_layer(middleware::from_fn_with_state(admin_key, require_admin_key))
}

pub fn api_v1_routes(admin_key: AdminKey) -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/quotes", post(handlers::quotes::submit_quote))
        .route(
            "/quotes/state",
            get(handlers::quotes::submission_state).delete(handlers::quotes::reset_submission),
        )
        .nest("/admin", admin_routes(admin_key))
}

/// Every route of the service with request ids attached. Transport layers
/// (tracing, CORS, compression) are added by the binary.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes(state.admin_key.clone()))
        .merge(openapi::swagger_ui())
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "curtain-quotes-api",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/swagger-ui",
    }))
}

async fn api_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "curtain-quotes-api",
        "environment": state.config.environment,
        "email_delivery": state.config.email.is_enabled(),
        "admin_key_required": state.admin_key.is_enabled(),
        "submission_throttle_secs": state.config.submission_throttle_secs,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let store_status = match state.order_store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "order store health check failed");
            "unhealthy"
        }
    };

    let health_data = json!({
        "status": store_status,
        "checks": {
            "order_store": store_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
