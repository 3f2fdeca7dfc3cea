//! Email rendering and delivery.
//!
//! Rendering is pure ([`render_template`] over a [`TemplateContext`] built by
//! an audience projection). [`EmailService`] ties the template repository,
//! the dispatcher and the email log together.

pub mod context;
pub mod dispatcher;
pub mod format;
pub mod render;
pub mod templates;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub use context::{admin_context, customer_context, BusinessProfile};
pub use dispatcher::{DisabledEmailDispatcher, EmailDispatcher, EmailError, HttpEmailDispatcher};
pub use render::{extract_placeholders, render_template, RenderedEmail, TemplateContext};
pub use templates::{TemplateRepository, TemplateUpdate};

use crate::errors::ServiceError;
use crate::models::{
    Audience, Customer, EmailLogEntry, EmailPayload, EmailStatus, EmailTemplate, Measurement,
    Order, OrderStatus,
};
use crate::repositories::EmailLogStore;

/// Renders both subject and body of `template` against `context`
pub fn render_email(template: &EmailTemplate, context: &TemplateContext) -> RenderedEmail {
    RenderedEmail {
        template_id: template.id.clone(),
        subject: render_template(&template.subject, context),
        html: render_template(&template.html, context),
    }
}

/// The two confirmations produced for a fresh submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConfirmationEmails {
    pub customer: RenderedEmail,
    pub admin: RenderedEmail,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TemplatePreview {
    pub email: RenderedEmail,
    /// Tokens in the template that this preview could not fill
    pub unresolved: Vec<String>,
}

/// Order used when previewing a template without a real one
pub fn sample_order() -> Order {
    Order {
        id: Uuid::nil(),
        customer: Customer {
            name: Some("María López".to_string()),
            tax_id: Some("B12345678".to_string()),
            address: Some("Madrid, Calle de Alcalá 120, 3º B".to_string()),
            region: Some("Madrid".to_string()),
            email: Some("maria@example.es".to_string()),
            phone: Some("+34 612 345 678".to_string()),
        },
        measurements: vec![
            Measurement {
                width: Decimal::new(150, 2),
                height: Decimal::new(220, 2),
                quantity: 2,
                unit_price: Some(Decimal::new(14_500, 2)),
                product_type: Some("Blackout".to_string()),
            },
            Measurement {
                width: Decimal::new(90, 2),
                height: Decimal::new(120, 2),
                quantity: 1,
                unit_price: Some(Decimal::new(8_950, 2)),
                product_type: Some("Voile".to_string()),
            },
        ],
        product_type: Some("Blackout".to_string()),
        total_price: Some(Decimal::new(37_950, 2)),
        total_units: 3,
        status: OrderStatus::Pending,
        reference_number: "CRT-20250101-0000ABCD".to_string(),
        budget_number: Some("PRES-20250102-0000EF12".to_string()),
        notes: Some("Salón, instalación en techo".to_string()),
        created_at: Utc
            .with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
        updated_at: None,
    }
}

#[derive(Clone)]
pub struct EmailService {
    templates: TemplateRepository,
    dispatcher: Arc<dyn EmailDispatcher>,
    log: Arc<dyn EmailLogStore>,
    profile: Arc<BusinessProfile>,
}

impl EmailService {
    pub fn new(
        templates: TemplateRepository,
        dispatcher: Arc<dyn EmailDispatcher>,
        log: Arc<dyn EmailLogStore>,
        profile: BusinessProfile,
    ) -> Self {
        Self {
            templates,
            dispatcher,
            log,
            profile: Arc::new(profile),
        }
    }

    pub fn templates(&self) -> &TemplateRepository {
        &self.templates
    }

    pub fn profile(&self) -> &BusinessProfile {
        &self.profile
    }

    /// Context for `template`'s audience with `extra` tokens layered on top
    pub async fn context(
        &self,
        template: &EmailTemplate,
        order: &Order,
        extra: &TemplateContext,
    ) -> Result<TemplateContext, ServiceError> {
        let styles = self.templates.styles().await?;
        let mut ctx = context::context_for(template.audience, order, &self.profile, &styles);
        for key in extra.keys() {
            if let Some(value) = extra.get(key) {
                ctx.insert(key, value);
            }
        }
        Ok(ctx)
    }

    pub async fn render(
        &self,
        template_id: &str,
        order: &Order,
        extra: &TemplateContext,
    ) -> Result<(RenderedEmail, TemplateContext), ServiceError> {
        let template = self.templates.require(template_id).await?;
        let ctx = self.context(&template, order, extra).await?;
        Ok((render_email(&template, &ctx), ctx))
    }

    pub async fn render_confirmations(
        &self,
        order: &Order,
    ) -> Result<ConfirmationEmails, ServiceError> {
        let none = TemplateContext::new();
        let (customer, _) = self
            .render(templates::CUSTOMER_CONFIRMATION, order, &none)
            .await?;
        let (admin, _) = self
            .render(templates::ADMIN_NOTIFICATION, order, &none)
            .await?;
        Ok(ConfirmationEmails { customer, admin })
    }

    pub async fn preview(
        &self,
        template_id: &str,
        order: &Order,
    ) -> Result<TemplatePreview, ServiceError> {
        let template = self.templates.require(template_id).await?;
        let ctx = self.context(&template, order, &TemplateContext::new()).await?;
        let unresolved = extract_placeholders(&format!("{}\n{}", template.subject, template.html))
            .into_iter()
            .filter(|token| !ctx.contains(token))
            .collect();
        Ok(TemplatePreview {
            email: render_email(&template, &ctx),
            unresolved,
        })
    }

    /// Renders, dispatches and logs one email. The attempt is logged either way.
    #[instrument(skip(self, order, extra), fields(order_id = %order.id))]
    pub async fn send(
        &self,
        template_id: &str,
        to: &str,
        order: &Order,
        extra: &TemplateContext,
    ) -> Result<EmailLogEntry, ServiceError> {
        let template = self.templates.require(template_id).await?;
        let ctx = self.context(&template, order, extra).await?;
        let rendered = render_email(&template, &ctx);
        let payload = EmailPayload {
            to: to.to_string(),
            subject: rendered.subject.clone(),
            html: rendered.html,
            template: template.id.clone(),
            data: ctx.to_json(),
        };

        let outcome = self.dispatcher.dispatch(&payload).await;
        let entry = EmailLogEntry {
            id: Uuid::new_v4(),
            order_id: Some(order.id),
            template_id: template.id.clone(),
            audience: template.audience,
            recipient: payload.to.clone(),
            subject: payload.subject.clone(),
            status: if outcome.is_ok() {
                EmailStatus::Sent
            } else {
                EmailStatus::Failed
            },
            error: outcome.as_ref().err().map(ToString::to_string),
            created_at: Utc::now(),
        };

        if let Err(e) = self.log.record(entry.clone()).await {
            warn!(error = %e, "failed to record email log entry");
        }

        match outcome {
            Ok(()) => {
                counter!("curtain_quotes.emails.sent", 1);
                info!(template = %template.id, "email sent");
                Ok(entry)
            }
            Err(e) => {
                counter!("curtain_quotes.emails.failed", 1);
                Err(e.into())
            }
        }
    }

    /// Sends the customer confirmation (when the customer left an address)
    /// and the internal notification. Failures are logged, never returned.
    pub async fn notify_submission(&self, order: &Order) {
        let none = TemplateContext::new();
        let customer_email = order
            .customer
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        if let Some(to) = customer_email {
            if let Err(e) = self
                .send(templates::CUSTOMER_CONFIRMATION, to, order, &none)
                .await
            {
                warn!(error = %e, reference = %order.reference_number, "customer confirmation not sent");
            }
        }
        let admin = self.profile.admin_recipient.clone();
        if let Err(e) = self
            .send(templates::ADMIN_NOTIFICATION, &admin, order, &none)
            .await
        {
            warn!(error = %e, reference = %order.reference_number, "admin notification not sent");
        }
    }

    /// Delivery attempts for one order, newest first
    pub async fn history(&self, order_id: Uuid) -> Result<Vec<EmailLogEntry>, ServiceError> {
        self.log.list_for_order(order_id).await
    }

    pub fn audience_recipient(&self, audience: Audience, order: &Order) -> Option<String> {
        match audience {
            Audience::Admin => Some(self.profile.admin_recipient.clone()),
            _ => order
                .customer
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }
}
