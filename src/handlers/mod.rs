pub mod dashboard;
pub mod orders;
pub mod quotes;
pub mod templates;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::kv_store::KeyValueStore;
use crate::models::{OrderFilter, OrderStatus};
use crate::repositories::{EmailLogStore, OrderStore};
use crate::services::{
    email::{BusinessProfile, EmailDispatcher, EmailService, TemplateRepository},
    export::ExportFormat,
    orders::OrderService,
    statistics::StatisticsService,
    submission::SubmissionService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub submissions: Arc<SubmissionService>,
    pub orders: Arc<OrderService>,
    pub statistics: Arc<StatisticsService>,
    pub email: Arc<EmailService>,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        order_store: Arc<dyn OrderStore>,
        email_log: Arc<dyn EmailLogStore>,
        client_state: Arc<dyn KeyValueStore>,
        dispatcher: Arc<dyn EmailDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let email = EmailService::new(
            TemplateRepository::new(client_state.clone()),
            dispatcher,
            email_log.clone(),
            BusinessProfile::from(config),
        );
        let submissions = SubmissionService::new(
            order_store.clone(),
            client_state,
            clock,
            email.clone(),
            config.submission_throttle(),
        )
        .with_notifications(config.email.notify_on_submission);

        Self {
            submissions: Arc::new(submissions),
            orders: Arc::new(OrderService::new(order_store.clone(), email.clone())),
            statistics: Arc::new(StatisticsService::new(order_store, email_log)),
            email: Arc::new(email),
        }
    }
}

/// Filters shared by the order list and the dashboard
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderQuery {
    /// pending, approved, rejected or completed
    pub status: Option<String>,
    /// First day included (YYYY-MM-DD)
    pub from: Option<NaiveDate>,
    /// Last day included (YYYY-MM-DD)
    pub to: Option<NaiveDate>,
    /// Matches name, email, phone, reference or budget number
    pub search: Option<String>,
}

impl OrderQuery {
    pub fn into_filter(self) -> Result<OrderFilter, ServiceError> {
        let status = self
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            .map(OrderStatus::parse)
            .transpose()?;

        let from = self.from.map(|day| day_bound(day, NaiveTime::MIN));
        let to = self.to.map(|day| day_bound(day, last_instant()));
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ServiceError::ValidationError(
                    "`from` must not be after `to`".to_string(),
                ));
            }
        }

        Ok(OrderFilter {
            status,
            from,
            to,
            search: self.search,
        })
    }
}

/// Order filters plus the download format
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// csv (default) or json
    pub format: Option<String>,
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub search: Option<String>,
}

impl ExportQuery {
    pub fn into_parts(self) -> Result<(ExportFormat, OrderFilter), ServiceError> {
        let format = match self.format.as_deref().map(str::trim) {
            None | Some("") => ExportFormat::default(),
            Some(raw) => ExportFormat::parse(raw)?,
        };
        let filter = OrderQuery {
            status: self.status,
            from: self.from,
            to: self.to,
            search: self.search,
        }
        .into_filter()?;
        Ok((format, filter))
    }
}

fn last_instant() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
}

fn day_bound(day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(time))
}
