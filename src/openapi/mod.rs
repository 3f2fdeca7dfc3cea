use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware_helpers::admin_key::ADMIN_KEY_HEADER;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Curtain Quotes API",
        version = "1.0.0",
        description = r#"
# Curtain Quotes API

Quote requests from the public wizard and the backoffice that manages them.

## Features

- **Quote intake**: Customers submit contact details and window measurements and receive a reference number
- **Order management**: Review, approve, reject, complete and delete requests
- **Budgets**: Send a numbered budget to the customer
- **Export**: Download the filtered orders as CSV or JSON
- **Email templates**: Edit, preview and reset the templates and their styles
- **Dashboard**: Revenue, material, region and email statistics

## Authentication

Routes under `/api/v1/admin` require the `X-Admin-Key` header when an admin key is configured.

## Throttling

A client (identified by `X-Client-Id`) may store one quote request every 30 seconds by default.
Rejected submissions answer `429` with a `Retry-After` header.
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
        (name = "quotes", description = "Public quote submission"),
        (name = "orders", description = "Backoffice order management"),
        (name = "dashboard", description = "Backoffice statistics"),
        (name = "email", description = "Email templates and styles")
    ),
    paths(
        // Quotes
        crate::handlers::quotes::submit_quote,
        crate::handlers::quotes::submission_state,
        crate::handlers::quotes::reset_submission,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::export_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::send_budget_email,
        crate::handlers::orders::order_emails,

        // Dashboard
        crate::handlers::dashboard::statistics,

        // Email
        crate::handlers::templates::list_templates,
        crate::handlers::templates::get_template,
        crate::handlers::templates::update_template,
        crate::handlers::templates::reset_template,
        crate::handlers::templates::preview_template,
        crate::handlers::templates::get_styles,
        crate::handlers::templates::update_styles,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::models::Order,
            crate::models::OrderStatus,
            crate::models::Customer,
            crate::models::Measurement,
            crate::models::StatisticsReport,
            crate::models::RecentOrder,
            crate::models::EmailTemplate,
            crate::models::EmailStyles,
            crate::models::EmailLogEntry,
            crate::services::export::ExportFormat,
            crate::services::export::ExportRow,
            crate::services::submission::QuoteForm,
            crate::services::submission::SubmissionReceipt,
            crate::services::submission::SubmissionState,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::BudgetEmailRequest,
            crate::services::email::TemplateUpdate,
            crate::handlers::templates::PreviewRequest,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&AdminKeyScheme)
)]
pub struct ApiDocV1;

struct AdminKeyScheme;

impl Modify for AdminKeyScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "AdminKey",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_KEY_HEADER))),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
