//! Backoffice order management: listing, status changes, deletion and the
//! budget email.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{EmailLogEntry, Order, OrderFilter, OrderStatus};
use crate::repositories::{order_not_found, reference::ReferenceGenerator, OrderStore};
use crate::services::email::{
    format::{escape_html, format_currency},
    templates, EmailService, TemplateContext,
};
use crate::services::export::{export_orders, ExportFile, ExportFormat};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    /// Email the customer about the change
    #[serde(default)]
    pub notify_customer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusChange {
    pub order: Order,
    /// Log entry of the customer notification, when one was sent
    pub notification: Option<EmailLogEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct BudgetEmailRequest {
    /// Overrides the customer's own address
    #[validate(email)]
    pub recipient: Option<String>,
    /// Defaults to the order total
    pub budget_total: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BudgetEmailResult {
    pub order: Order,
    pub email: EmailLogEntry,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    email: EmailService,
    references: ReferenceGenerator,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, email: EmailService) -> Self {
        Self {
            store,
            email,
            references: ReferenceGenerator,
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        self.store.select(filter).await
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.store.get(id).await?.ok_or_else(|| order_not_found(id))
    }

    #[instrument(skip(self, request), fields(order_id = %id, new_status = %request.status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<StatusChange, ServiceError> {
        let order = self.store.update_status(id, request.status).await?;
        info!(reference = %order.reference_number, "order status updated");

        let mut notification = None;
        if request.notify_customer {
            match self.email.audience_recipient(crate::models::Audience::Customer, &order) {
                Some(to) => {
                    match self
                        .email
                        .send(templates::STATUS_UPDATE, &to, &order, &TemplateContext::new())
                        .await
                    {
                        Ok(entry) => notification = Some(entry),
                        Err(e) => warn!(error = %e, "status notification not sent"),
                    }
                }
                None => warn!("customer has no email address, status notification skipped"),
            }
        }

        Ok(StatusChange {
            order,
            notification,
        })
    }

    /// Orders matching `filter`, rendered as a downloadable file
    #[instrument(skip(self))]
    pub async fn export(
        &self,
        filter: &OrderFilter,
        format: ExportFormat,
    ) -> Result<ExportFile, ServiceError> {
        let orders = self.store.select(filter).await?;
        let file = export_orders(&orders, format, Utc::now().date_naive())?;
        info!(rows = orders.len(), %format, "orders exported");
        Ok(file)
    }

    /// Email log of an existing order, newest first
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn email_history(&self, id: Uuid) -> Result<Vec<EmailLogEntry>, ServiceError> {
        self.get(id).await?;
        self.email.history(id).await
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.delete(id).await?;
        info!("order deleted");
        Ok(())
    }

    /// Sends the budget to the customer, numbering the budget on first send
    #[instrument(skip(self, request), fields(order_id = %id))]
    pub async fn send_budget_email(
        &self,
        id: Uuid,
        request: BudgetEmailRequest,
    ) -> Result<BudgetEmailResult, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let order = self.get(id).await?;
        let recipient = request
            .recipient
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.email
                    .audience_recipient(crate::models::Audience::Customer, &order)
            })
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "The order has no customer email; provide a recipient".to_string(),
                )
            })?;

        let order = match order.budget_number {
            Some(_) => order,
            None => {
                let number = self.references.budget_number(Utc::now());
                self.store.assign_budget_number(id, &number).await?
            }
        };

        let total = request
            .budget_total
            .or(order.total_price)
            .unwrap_or(Decimal::ZERO);
        let mut extra = TemplateContext::new();
        extra
            .insert("budget_total", format_currency(total))
            .insert(
                "budget_message",
                escape_html(request.message.as_deref().unwrap_or_default()),
            );

        let email = self
            .email
            .send(templates::BUDGET, &recipient, &order, &extra)
            .await?;
        Ok(BudgetEmailResult { order, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::{InMemoryKeyValueStore, KeyValueStore};
    use crate::models::{Customer, EmailPayload, EmailStatus, Measurement, NewOrder};
    use crate::repositories::{InMemoryEmailLogStore, InMemoryOrderStore};
    use crate::services::email::{
        context::tests::profile, EmailDispatcher, EmailError, TemplateRepository,
    };
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<EmailPayload>>);

    #[async_trait]
    impl EmailDispatcher for Outbox {
        async fn dispatch(&self, payload: &EmailPayload) -> Result<(), EmailError> {
            self.0.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    struct Harness {
        service: OrderService,
        store: Arc<InMemoryOrderStore>,
        outbox: Arc<Outbox>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryOrderStore::new());
        let outbox = Arc::new(Outbox::default());
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let email = EmailService::new(
            TemplateRepository::new(kv),
            outbox.clone(),
            Arc::new(InMemoryEmailLogStore::new()),
            profile(),
        );
        Harness {
            service: OrderService::new(store.clone(), email),
            store,
            outbox,
        }
    }

    async fn seed(store: &InMemoryOrderStore, email: Option<&str>) -> Uuid {
        store
            .insert(NewOrder {
                customer: Customer {
                    name: Some("Ana".into()),
                    email: email.map(Into::into),
                    ..Default::default()
                },
                measurements: vec![Measurement {
                    width: dec!(1.2),
                    height: dec!(2),
                    quantity: 1,
                    unit_price: Some(dec!(1234.5)),
                    product_type: Some("Roller".into()),
                }],
                total_price: Some(dec!(1234.5)),
                total_units: 1,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn status_update_can_notify_customer() {
        let h = harness();
        let id = seed(&h.store, Some("ana@example.com")).await;

        let change = h
            .service
            .update_status(
                id,
                UpdateOrderStatusRequest {
                    status: OrderStatus::Approved,
                    notify_customer: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(change.order.status, OrderStatus::Approved);
        assert_eq!(change.notification.unwrap().status, EmailStatus::Sent);

        let sent = h.outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, templates::STATUS_UPDATE);
        assert!(sent[0].subject.contains("aprobada"));
    }

    #[tokio::test]
    async fn budget_email_assigns_number_once() {
        let h = harness();
        let id = seed(&h.store, Some("ana@example.com")).await;

        let first = h
            .service
            .send_budget_email(id, BudgetEmailRequest::default())
            .await
            .unwrap();
        let number = first.order.budget_number.clone().unwrap();
        assert!(number.starts_with("PRES-"));
        assert_eq!(first.email.recipient, "ana@example.com");

        let second = h
            .service
            .send_budget_email(
                id,
                BudgetEmailRequest {
                    recipient: Some("office@example.com".into()),
                    budget_total: Some(dec!(999.9)),
                    message: Some("Valid <30> days".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(second.order.budget_number.as_deref(), Some(number.as_str()));
        assert_eq!(second.email.recipient, "office@example.com");

        let sent = h.outbox.0.lock().unwrap();
        assert!(sent[0].html.contains("1.234,50 €"));
        assert!(sent[1].html.contains("999,90 €"));
        assert!(sent[1].html.contains("Valid &lt;30&gt; days"));
    }

    #[tokio::test]
    async fn budget_email_needs_a_recipient() {
        let h = harness();
        let id = seed(&h.store, None).await;
        assert_matches!(
            h.service.send_budget_email(id, BudgetEmailRequest::default()).await,
            Err(ServiceError::ValidationError(_))
        );
        assert!(h.outbox.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn email_history_lists_sends_newest_first() {
        let h = harness();
        let id = seed(&h.store, Some("ana@example.com")).await;
        let other = seed(&h.store, Some("bruno@example.com")).await;

        assert!(h.service.email_history(id).await.unwrap().is_empty());
        h.service
            .send_budget_email(id, BudgetEmailRequest::default())
            .await
            .unwrap();
        h.service
            .send_budget_email(other, BudgetEmailRequest::default())
            .await
            .unwrap();
        h.service
            .update_status(
                id,
                UpdateOrderStatusRequest {
                    status: OrderStatus::Approved,
                    notify_customer: true,
                },
            )
            .await
            .unwrap();

        let history = h.service.email_history(id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.order_id == Some(id)));
        assert!(history[0].created_at >= history[1].created_at);
        assert_matches!(
            h.service.email_history(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn export_respects_the_filter() {
        let h = harness();
        let id = seed(&h.store, Some("ana@example.com")).await;
        seed(&h.store, Some("bruno@example.com")).await;
        h.store.update_status(id, OrderStatus::Rejected).await.unwrap();

        let file = h
            .service
            .export(
                &OrderFilter {
                    status: Some(OrderStatus::Rejected),
                    ..Default::default()
                },
                ExportFormat::Csv,
            )
            .await
            .unwrap();
        let lines: Vec<&str> = file.body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with(&id.to_string()));
        assert!(lines[1].contains("ana@example.com"));
        assert!(file.filename.ends_with(".csv"));
    }

    #[tokio::test]
    async fn missing_orders_are_not_found() {
        let h = harness();
        assert_matches!(
            h.service.get(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            h.service.delete(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
