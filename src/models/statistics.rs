use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::order::OrderStatus;

/// Dashboard view over a set of orders. Recomputed on every request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    pub total_customers: u64,
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub avg_order_value: Decimal,
    pub pending_orders: u64,
    pub approved_orders: u64,
    pub completed_orders: u64,
    /// Rejected orders
    pub cancelled_orders: u64,
    pub pending_revenue: Decimal,
    pub completed_revenue: Decimal,
    pub top_materials: Vec<MaterialStat>,
    pub top_regions: Vec<RegionStat>,
    pub shipping: ShippingMetrics,
    pub customers: CustomerMetrics,
    pub products: ProductMetrics,
    pub emails: EmailMetrics,
    /// Newest orders first, at most ten
    pub recent_orders: Vec<RecentOrder>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub id: Uuid,
    pub reference_number: String,
    pub customer_name: Option<String>,
    pub status: OrderStatus,
    pub total_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaterialStat {
    pub name: String,
    pub orders: u64,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegionStat {
    pub region: String,
    pub orders: u64,
    pub customers: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMetrics {
    pub awaiting_approval: u64,
    pub in_production: u64,
    pub delivered: u64,
    pub cancelled: u64,
    /// Completed orders over non-rejected orders, in percent
    pub delivery_rate: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMetrics {
    pub total_customers: u64,
    pub returning_customers: u64,
    pub avg_orders_per_customer: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductMetrics {
    pub distinct_materials: u64,
    pub best_seller: Option<String>,
    pub total_units: u64,
    pub total_measurements: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailMetrics {
    pub sent: u64,
    pub failed: u64,
    pub customer_sent: u64,
    pub admin_sent: u64,
}
