use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{order_not_found, reference::ReferenceGenerator, EmailLogStore, OrderStore};
use crate::errors::ServiceError;
use crate::models::{EmailLogEntry, InsertedOrder, NewOrder, Order, OrderFilter, OrderStatus};

/// Process-local order store. Ties on `created_at` keep insertion order.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, (u64, Order)>,
    sequence: AtomicU64,
    insert_calls: AtomicU64,
    fail_next_insert: Mutex<Option<ServiceError>>,
    references: ReferenceGenerator,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a fully formed order, bypassing the submission path
    pub fn seed(&self, order: Order) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.orders.insert(order.id, (seq, order));
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// How many times `insert` was called, including failed calls
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Makes the next `insert` fail with `error`
    pub fn fail_next_insert(&self, error: ServiceError) {
        let mut slot = self
            .fail_next_insert
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(error);
    }

    fn take_failure(&self) -> Option<ServiceError> {
        self.fail_next_insert
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, new_order: NewOrder) -> Result<InsertedOrder, ServiceError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        let now = Utc::now();
        let reference_number = self.references.reference_number(now);
        if self
            .orders
            .iter()
            .any(|entry| entry.value().1.reference_number == reference_number)
        {
            return Err(ServiceError::Conflict(
                "We could not assign a reference to your request. Please submit it again."
                    .to_string(),
            ));
        }

        let order = Order {
            id: Uuid::new_v4(),
            customer: new_order.customer,
            measurements: new_order.measurements,
            product_type: new_order.product_type,
            total_price: new_order.total_price,
            total_units: new_order.total_units,
            status: OrderStatus::Pending,
            reference_number: reference_number.clone(),
            budget_number: None,
            notes: new_order.notes,
            created_at: now,
            updated_at: None,
        };
        let id = order.id;
        self.seed(order);
        Ok(InsertedOrder {
            id,
            reference_number,
        })
    }

    async fn select(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let mut matching: Vec<(u64, Order)> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_a.cmp(seq_b))
        });
        Ok(matching.into_iter().map(|(_, order)| order).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().1.clone()))
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, ServiceError> {
        let mut entry = self.orders.get_mut(&id).ok_or_else(|| order_not_found(id))?;
        let order = &mut entry.value_mut().1;
        order.status.ensure_transition(status)?;
        order.status = status;
        order.updated_at = Some(Utc::now());
        Ok(order.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.orders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| order_not_found(id))
    }

    async fn assign_budget_number(
        &self,
        id: Uuid,
        budget_number: &str,
    ) -> Result<Order, ServiceError> {
        let mut entry = self.orders.get_mut(&id).ok_or_else(|| order_not_found(id))?;
        let order = &mut entry.value_mut().1;
        order.budget_number = Some(budget_number.to_string());
        order.updated_at = Some(Utc::now());
        Ok(order.clone())
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEmailLogStore {
    entries: Mutex<Vec<EmailLogEntry>>,
}

impl InMemoryEmailLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<EmailLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EmailLogStore for InMemoryEmailLogStore {
    async fn record(&self, entry: EmailLogEntry) -> Result<(), ServiceError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
        Ok(())
    }

    async fn list(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailLogEntry>, ServiceError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut listed: Vec<EmailLogEntry> = entries
            .iter()
            .filter(|e| from.map_or(true, |from| e.created_at >= from))
            .filter(|e| to.map_or(true, |to| e.created_at <= to))
            .cloned()
            .collect();
        listed.sort_by_key(|e| e.created_at);
        Ok(listed)
    }

    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<EmailLogEntry>, ServiceError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut history: Vec<EmailLogEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.order_id == Some(order_id))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Audience, Customer, EmailStatus};
    use assert_matches::assert_matches;

    fn new_order(name: &str) -> NewOrder {
        NewOrder {
            customer: Customer {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_assigns_reference_and_pending_status() {
        let store = InMemoryOrderStore::new();
        let inserted = store.insert(new_order("Ana")).await.unwrap();
        let order = store.get(inserted.id).await.unwrap().unwrap();
        assert_eq!(order.reference_number, inserted.reference_number);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(store.insert_calls(), 1);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = InMemoryOrderStore::new();
        store.fail_next_insert(ServiceError::database_error_message("down"));
        assert_matches!(
            store.insert(new_order("Ana")).await,
            Err(ServiceError::DatabaseError(_))
        );
        assert!(store.is_empty());
        assert!(store.insert(new_order("Ana")).await.is_ok());
        assert_eq!(store.insert_calls(), 2);
    }

    #[tokio::test]
    async fn update_status_enforces_lifecycle() {
        let store = InMemoryOrderStore::new();
        let id = store.insert(new_order("Ana")).await.unwrap().id;

        assert_matches!(
            store.update_status(id, OrderStatus::Pending).await,
            Err(ServiceError::InvalidStatus(_))
        );
        store.update_status(id, OrderStatus::Approved).await.unwrap();
        let done = store.update_status(id, OrderStatus::Completed).await.unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        assert_matches!(
            store.update_status(Uuid::new_v4(), OrderStatus::Approved).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn delete_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let id = store.insert(new_order("Ana")).await.unwrap().id;
        store.delete(id).await.unwrap();
        assert_matches!(store.delete(id).await, Err(ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn budget_number_is_searchable() {
        let store = InMemoryOrderStore::new();
        let id = store.insert(new_order("Ana")).await.unwrap().id;
        store.insert(new_order("Bruno")).await.unwrap();
        store
            .assign_budget_number(id, "PRES-20250301-00AA11BB")
            .await
            .unwrap();

        let found = store
            .select(&OrderFilter {
                search: Some("00aa11".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
    }

    fn log_entry(order_id: Option<Uuid>, subject: &str, minutes: i64) -> EmailLogEntry {
        EmailLogEntry {
            id: Uuid::new_v4(),
            order_id,
            template_id: "budget".into(),
            audience: Audience::Customer,
            recipient: "ana@example.es".into(),
            subject: subject.into(),
            status: EmailStatus::Sent,
            error: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn order_history_is_newest_first_and_scoped() {
        let log = InMemoryEmailLogStore::new();
        let order = Uuid::new_v4();
        log.record(log_entry(Some(order), "primero", 1)).await.unwrap();
        log.record(log_entry(Some(Uuid::new_v4()), "otro pedido", 2)).await.unwrap();
        log.record(log_entry(None, "sin pedido", 3)).await.unwrap();
        log.record(log_entry(Some(order), "segundo", 4)).await.unwrap();

        let history = log.list_for_order(order).await.unwrap();
        let subjects: Vec<&str> = history.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["segundo", "primero"]);
        assert!(log.list_for_order(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
