use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::error;
use uuid::Uuid;

use super::EmailLogStore;
use crate::entities::email_log;
use crate::errors::ServiceError;
use crate::models::EmailLogEntry;

#[derive(Clone)]
pub struct SeaOrmEmailLogStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmEmailLogStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmailLogStore for SeaOrmEmailLogStore {
    async fn record(&self, entry: EmailLogEntry) -> Result<(), ServiceError> {
        email_log::ActiveModel {
            id: Set(entry.id),
            order_id: Set(entry.order_id),
            template_id: Set(entry.template_id),
            audience: Set(entry.audience.as_ref().to_string()),
            recipient: Set(entry.recipient),
            subject: Set(entry.subject),
            status: Set(entry.status.as_ref().to_string()),
            error: Set(entry.error),
            created_at: Set(entry.created_at),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to record email log entry");
            ServiceError::DatabaseError(e)
        })?;
        Ok(())
    }

    async fn list(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailLogEntry>, ServiceError> {
        let mut query = email_log::Entity::find();
        if let Some(from) = from {
            query = query.filter(email_log::Column::CreatedAt.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(email_log::Column::CreatedAt.lte(to));
        }
        let rows = query
            .order_by_asc(email_log::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list email log");
                ServiceError::DatabaseError(e)
            })?;
        rows.into_iter().map(EmailLogEntry::try_from).collect()
    }

    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<EmailLogEntry>, ServiceError> {
        let rows = email_log::Entity::find()
            .filter(email_log::Column::OrderId.eq(order_id))
            .order_by_desc(email_log::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to load email history");
                ServiceError::DatabaseError(e)
            })?;
        rows.into_iter().map(EmailLogEntry::try_from).collect()
    }
}
