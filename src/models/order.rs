use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{order, order_measurement};
use crate::errors::ServiceError;

/// Lifecycle of a quote request.
///
/// Only `pending -> approved`, `pending -> rejected` and `approved -> completed`
/// are allowed; every other move, including staying put, is refused.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OrderStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Completed => "completed",
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Approved)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Approved, OrderStatus::Completed)
        )
    }

    /// Returns an `InvalidStatus` error unless `self -> next` is allowed
    pub fn ensure_transition(self, next: OrderStatus) -> Result<(), ServiceError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ServiceError::InvalidStatus(format!(
                "cannot move an order from {} to {}",
                self, next
            )))
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        raw.trim()
            .parse::<OrderStatus>()
            .map_err(|_| ServiceError::InvalidStatus(format!("Unknown order status: {raw}")))
    }
}

/// Contact details captured by the wizard; every field is optional
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One window: dimensions in meters, quantity and optional unit price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Measurement {
    pub width: Decimal,
    pub height: Decimal,
    pub quantity: u32,
    pub unit_price: Option<Decimal>,
    pub product_type: Option<String>,
}

impl Measurement {
    /// Unit price times quantity; `None` when the product leaves `Decimal` range
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price
            .unwrap_or_default()
            .checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer: Customer,
    pub measurements: Vec<Measurement>,
    pub product_type: Option<String>,
    pub total_price: Option<Decimal>,
    pub total_units: u32,
    pub status: OrderStatus,
    pub reference_number: String,
    pub budget_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds the domain order from its row and its measurement rows.
    /// Measurement rows are sorted by position before conversion.
    pub fn from_models(
        model: order::Model,
        mut lines: Vec<order_measurement::Model>,
    ) -> Result<Self, ServiceError> {
        lines.sort_by_key(|line| line.position);
        let status = OrderStatus::parse(&model.status)?;

        Ok(Self {
            id: model.id,
            customer: Customer {
                name: model.customer_name,
                tax_id: model.customer_tax_id,
                address: model.customer_address,
                region: model.customer_region,
                email: model.customer_email,
                phone: model.customer_phone,
            },
            measurements: lines
                .into_iter()
                .map(|line| Measurement {
                    width: line.width,
                    height: line.height,
                    quantity: u32::try_from(line.quantity).unwrap_or(0),
                    unit_price: line.unit_price,
                    product_type: line.product_type,
                })
                .collect(),
            product_type: model.product_type,
            total_price: model.total_price,
            total_units: u32::try_from(model.total_units).unwrap_or(0),
            status,
            reference_number: model.reference_number,
            budget_number: model.budget_number,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Payload handed to the store on submission
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer: Customer,
    pub measurements: Vec<Measurement>,
    pub product_type: Option<String>,
    pub total_price: Option<Decimal>,
    pub total_units: u32,
    pub notes: Option<String>,
}

/// What the store hands back after a successful insert
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InsertedOrder {
    pub id: Uuid,
    pub reference_number: String,
}

/// Conjunctive filter for order selection; `None` fields do not constrain
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl OrderFilter {
    /// Lowercased, trimmed search text; blank searches are ignored
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|status| status != order.status) {
            return false;
        }
        if self.from.is_some_and(|from| order.created_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| order.created_at > to) {
            return false;
        }
        match self.search_term() {
            None => true,
            Some(term) => [
                order.customer.name.as_deref(),
                order.customer.email.as_deref(),
                Some(order.reference_number.as_str()),
                order.customer.phone.as_deref(),
                order.budget_number.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&term)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Approved, true)]
    #[case(OrderStatus::Pending, OrderStatus::Rejected, true)]
    #[case(OrderStatus::Approved, OrderStatus::Completed, true)]
    #[case(OrderStatus::Pending, OrderStatus::Pending, false)]
    #[case(OrderStatus::Pending, OrderStatus::Completed, false)]
    #[case(OrderStatus::Approved, OrderStatus::Rejected, false)]
    #[case(OrderStatus::Approved, OrderStatus::Approved, false)]
    #[case(OrderStatus::Rejected, OrderStatus::Approved, false)]
    #[case(OrderStatus::Completed, OrderStatus::Pending, false)]
    fn status_transitions(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
        assert_eq!(from.ensure_transition(to).is_ok(), allowed);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(OrderStatus::parse("Approved").unwrap(), OrderStatus::Approved);
        assert_eq!(OrderStatus::parse(" completed ").unwrap(), OrderStatus::Completed);
        assert!(matches!(
            OrderStatus::parse("shipped"),
            Err(ServiceError::InvalidStatus(_))
        ));
        assert_eq!(OrderStatus::Rejected.to_string(), "rejected");
    }

    fn sample_order() -> Order {
        Order {
            id: Uuid::new_v4(),
            customer: Customer {
                name: Some("Ana Pérez".into()),
                email: Some("ana@example.com".into()),
                phone: Some("+34 600 555 000".into()),
                ..Default::default()
            },
            measurements: vec![],
            product_type: Some("Blackout".into()),
            total_price: None,
            total_units: 0,
            status: OrderStatus::Pending,
            reference_number: "CRT-20250301-0A1B2C3D".into(),
            budget_number: Some("PRES-0042".into()),
            notes: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn filter_is_conjunctive() {
        let order = sample_order();
        assert!(OrderFilter::default().matches(&order));

        let filter = OrderFilter {
            status: Some(OrderStatus::Pending),
            search: Some("ANA@".into()),
            ..Default::default()
        };
        assert!(filter.matches(&order));

        let filter = OrderFilter {
            status: Some(OrderStatus::Approved),
            search: Some("ana".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&order));
    }

    #[test]
    fn filter_date_bounds_are_inclusive() {
        let order = sample_order();
        let filter = OrderFilter {
            from: Some(order.created_at),
            to: Some(order.created_at),
            ..Default::default()
        };
        assert!(filter.matches(&order));

        let filter = OrderFilter {
            from: Some(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(!filter.matches(&order));
    }

    #[test]
    fn search_covers_reference_phone_and_budget() {
        let order = sample_order();
        for term in ["0a1b2c3d", "5555", "pres-0042", "pérez"] {
            let filter = OrderFilter {
                search: Some(term.into()),
                ..Default::default()
            };
            assert!(filter.matches(&order), "term {term} should match");
        }
        let blank = OrderFilter {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.matches(&order));
    }

    #[test]
    fn line_total_treats_missing_price_as_zero() {
        let line = Measurement {
            width: Decimal::new(150, 2),
            height: Decimal::new(220, 2),
            quantity: 3,
            unit_price: None,
            product_type: None,
        };
        assert_eq!(line.line_total(), Some(Decimal::ZERO));
        let priced = Measurement {
            unit_price: Some(Decimal::new(1000, 1)),
            ..line.clone()
        };
        assert_eq!(priced.line_total(), Some(Decimal::new(300, 0)));
        let huge = Measurement {
            unit_price: Some(Decimal::MAX),
            ..line
        };
        assert_eq!(huge.line_total(), None);
    }
}
