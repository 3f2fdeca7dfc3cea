//! Persistence boundary for orders and the email log.
//!
//! Services only see the [`OrderStore`] and [`EmailLogStore`] traits; the
//! sea-orm implementations back the running server and the in-memory ones
//! back tests and local demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{EmailLogEntry, InsertedOrder, NewOrder, Order, OrderFilter, OrderStatus};

pub mod email_log_repository;
pub mod in_memory;
pub mod order_repository;
pub mod reference;

pub use email_log_repository::SeaOrmEmailLogStore;
pub use in_memory::{InMemoryEmailLogStore, InMemoryOrderStore};
pub use order_repository::SeaOrmOrderStore;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new pending order and assigns its reference number
    async fn insert(&self, order: NewOrder) -> Result<InsertedOrder, ServiceError>;

    /// Orders matching every set field of `filter`, newest first
    async fn select(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    /// Moves an order to `status`; refuses transitions the lifecycle does not allow
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, ServiceError>;

    /// Removes an order together with its measurements
    async fn delete(&self, id: Uuid) -> Result<(), ServiceError>;

    async fn assign_budget_number(
        &self,
        id: Uuid,
        budget_number: &str,
    ) -> Result<Order, ServiceError>;

    async fn ping(&self) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait EmailLogStore: Send + Sync {
    async fn record(&self, entry: EmailLogEntry) -> Result<(), ServiceError>;

    /// Entries with `from <= created_at <= to`, oldest first
    async fn list(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailLogEntry>, ServiceError>;

    /// Every entry recorded for `order_id`, newest first
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<EmailLogEntry>, ServiceError>;
}

pub(crate) fn order_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Order {} not found", id))
}
