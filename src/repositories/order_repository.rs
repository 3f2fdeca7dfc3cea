use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::{order_not_found, reference::ReferenceGenerator, OrderStore};
use crate::entities::{order, order_measurement};
use crate::errors::ServiceError;
use crate::models::{InsertedOrder, NewOrder, Order, OrderFilter, OrderStatus};

/// Relational order store
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
    references: ReferenceGenerator,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            references: ReferenceGenerator,
        }
    }

    async fn load_measurements(
        &self,
        order_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<order_measurement::Model>>, ServiceError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = order_measurement::Entity::find()
            .filter(order_measurement::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load order measurements");
                ServiceError::DatabaseError(e)
            })?;

        let mut grouped: HashMap<Uuid, Vec<order_measurement::Model>> = HashMap::new();
        for row in rows {
            grouped.entry(row.order_id).or_default().push(row);
        }
        Ok(grouped)
    }

    async fn find_model(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| order_not_found(id))
    }

    async fn hydrate(&self, model: order::Model) -> Result<Order, ServiceError> {
        let id = model.id;
        let mut lines = self.load_measurements(vec![id]).await?;
        Order::from_models(model, lines.remove(&id).unwrap_or_default())
    }
}

fn filter_condition(filter: &OrderFilter) -> Condition {
    let mut condition = Condition::all();
    if let Some(status) = filter.status {
        condition = condition.add(order::Column::Status.eq(status.as_str()));
    }
    if let Some(from) = filter.from {
        condition = condition.add(order::Column::CreatedAt.gte(from));
    }
    if let Some(to) = filter.to {
        condition = condition.add(order::Column::CreatedAt.lte(to));
    }
    if let Some(term) = filter.search_term() {
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let searchable = [
            order::Column::CustomerName,
            order::Column::CustomerEmail,
            order::Column::ReferenceNumber,
            order::Column::CustomerPhone,
            order::Column::BudgetNumber,
        ];
        let any = searchable.into_iter().fold(Condition::any(), |acc, column| {
            acc.add(
                Expr::expr(Func::lower(Expr::col(column)))
                    .like(LikeExpr::new(pattern.clone()).escape('\\')),
            )
        });
        condition = condition.add(any);
    }
    condition
}

fn map_insert_error(e: DbErr) -> ServiceError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            error!(detail = %detail, "Reference number collision on insert");
            ServiceError::Conflict(
                "We could not assign a reference to your request. Please submit it again."
                    .to_string(),
            )
        }
        _ => {
            error!(error = %e, "Failed to insert order");
            ServiceError::DatabaseError(e)
        }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, new_order), fields(lines = new_order.measurements.len()))]
    async fn insert(&self, new_order: NewOrder) -> Result<InsertedOrder, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let reference_number = self.references.reference_number(now);
        let total_units = i32::try_from(new_order.total_units).map_err(|_| {
            ServiceError::ValidationError("total units out of range".to_string())
        })?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order insert");
            ServiceError::DatabaseError(e)
        })?;

        let customer = new_order.customer;
        order::ActiveModel {
            id: Set(order_id),
            reference_number: Set(reference_number.clone()),
            budget_number: Set(None),
            customer_name: Set(customer.name),
            customer_tax_id: Set(customer.tax_id),
            customer_address: Set(customer.address),
            customer_region: Set(customer.region),
            customer_email: Set(customer.email),
            customer_phone: Set(customer.phone),
            product_type: Set(new_order.product_type),
            total_price: Set(new_order.total_price),
            total_units: Set(total_units),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            notes: Set(new_order.notes),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(map_insert_error)?;

        for (position, line) in new_order.measurements.into_iter().enumerate() {
            order_measurement::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
                width: Set(line.width),
                height: Set(line.height),
                quantity: Set(i32::try_from(line.quantity).unwrap_or(i32::MAX)),
                unit_price: Set(line.unit_price),
                product_type: Set(line.product_type),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert measurement");
                ServiceError::DatabaseError(e)
            })?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order insert");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, reference = %reference_number, "Order stored");
        Ok(InsertedOrder {
            id: order_id,
            reference_number,
        })
    }

    #[instrument(skip(self))]
    async fn select(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let models = order::Entity::find()
            .filter(filter_condition(filter))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to select orders");
                ServiceError::DatabaseError(e)
            })?;

        let mut lines = self
            .load_measurements(models.iter().map(|m| m.id).collect())
            .await?;

        models
            .into_iter()
            .map(|model| {
                let rows = lines.remove(&model.id).unwrap_or_default();
                Order::from_models(model, rows)
            })
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        match self.find_model(id).await {
            Ok(model) => self.hydrate(model).await.map(Some),
            Err(ServiceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(order_id = %id, new_status = %status))]
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, ServiceError> {
        let model = self.find_model(id).await?;
        OrderStatus::parse(&model.status)?.ensure_transition(status)?;

        let mut active = model.into_active_model();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %id, status = %status, "Order status updated");
        self.hydrate(updated).await
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order delete");
            ServiceError::DatabaseError(e)
        })?;

        order_measurement::Entity::delete_many()
            .filter(order_measurement::Column::OrderId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let result = order::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if result.rows_affected == 0 {
            return Err(order_not_found(id));
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to commit order delete");
            ServiceError::DatabaseError(e)
        })?;
        info!(order_id = %id, "Order deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn assign_budget_number(
        &self,
        id: Uuid,
        budget_number: &str,
    ) -> Result<Order, ServiceError> {
        let mut active = self.find_model(id).await?.into_active_model();
        active.budget_number = Set(Some(budget_number.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to store budget number");
            ServiceError::DatabaseError(e)
        })?;
        self.hydrate(updated).await
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        self.db.ping().await.map_err(ServiceError::DatabaseError)
    }
}
