//! Dashboard aggregation.
//!
//! [`compute_statistics`] is a pure fold over the fetched orders and email
//! log; [`StatisticsService`] only fetches and delegates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::errors::ServiceError;
use crate::models::statistics::{
    CustomerMetrics, EmailMetrics, MaterialStat, ProductMetrics, RecentOrder, RegionStat,
    ShippingMetrics,
};
use crate::models::{
    Audience, EmailLogEntry, EmailStatus, Order, OrderFilter, OrderStatus, StatisticsReport,
};
use crate::repositories::{EmailLogStore, OrderStore};

pub const TOP_N: usize = 5;
pub const UNKNOWN_MATERIAL: &str = "Unknown";
pub const NO_ZONE: &str = "No zone";
pub const RECENT_ORDERS: usize = 10;

/// Customers are identified by e-mail; every order without one shares this bucket.
fn customer_key(order: &Order) -> String {
    order
        .customer
        .email
        .as_deref()
        .map(|email| email.trim().to_lowercase())
        .unwrap_or_default()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn material_label(order: &Order) -> String {
    non_blank(order.product_type.as_deref())
        .unwrap_or(UNKNOWN_MATERIAL)
        .to_string()
}

fn region_label(order: &Order) -> String {
    non_blank(order.customer.region.as_deref())
        .or_else(|| {
            order
                .customer
                .address
                .as_deref()
                .and_then(|address| non_blank(address.split(',').next()))
        })
        .unwrap_or(NO_ZONE)
        .to_string()
}

fn order_revenue(order: &Order) -> Decimal {
    order.total_price.unwrap_or_default().max(Decimal::ZERO)
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Groups keep first-seen order so the stable sort resolves ties by encounter.
struct Groups<T> {
    index: HashMap<String, usize>,
    entries: Vec<(String, T)>,
}

impl<T: Default> Groups<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn entry(&mut self, key: String) -> &mut T {
        let next = self.entries.len();
        let slot = *self.index.entry(key.clone()).or_insert(next);
        if slot == next {
            self.entries.push((key, T::default()));
        }
        &mut self.entries[slot].1
    }
}

#[derive(Default)]
struct MaterialAcc {
    orders: u64,
    revenue: Decimal,
}

#[derive(Default)]
struct RegionAcc {
    orders: u64,
    customers: HashSet<String>,
}

pub fn compute_statistics(orders: &[Order], email_log: &[EmailLogEntry]) -> StatisticsReport {
    let mut report = StatisticsReport {
        total_orders: orders.len() as u64,
        ..Default::default()
    };

    let mut orders_per_customer: HashMap<String, u64> = HashMap::new();
    let mut materials: Groups<MaterialAcc> = Groups::new();
    let mut regions: Groups<RegionAcc> = Groups::new();
    let mut total_units: u64 = 0;
    let mut total_measurements: u64 = 0;

    for order in orders {
        let revenue = order_revenue(order);
        let customer = customer_key(order);
        report.total_revenue = report.total_revenue.saturating_add(revenue);

        match order.status {
            OrderStatus::Pending => {
                report.pending_orders += 1;
                report.pending_revenue = report.pending_revenue.saturating_add(revenue);
            }
            OrderStatus::Approved => report.approved_orders += 1,
            OrderStatus::Completed => {
                report.completed_orders += 1;
                report.completed_revenue = report.completed_revenue.saturating_add(revenue);
            }
            OrderStatus::Rejected => report.cancelled_orders += 1,
        }

        *orders_per_customer.entry(customer.clone()).or_default() += 1;

        let material = materials.entry(material_label(order));
        material.orders += 1;
        material.revenue = material.revenue.saturating_add(revenue);

        let region = regions.entry(region_label(order));
        region.orders += 1;
        region.customers.insert(customer);

        total_units = total_units.saturating_add(u64::from(order.total_units));
        total_measurements += order.measurements.len() as u64;
    }

    if !orders.is_empty() {
        report.avg_order_value = report.total_revenue / Decimal::from(report.total_orders);
    }
    report.total_customers = orders_per_customer.len() as u64;

    let distinct_materials = materials.entries.len() as u64;
    let mut top_materials: Vec<MaterialStat> = materials
        .entries
        .into_iter()
        .map(|(name, acc)| MaterialStat {
            name,
            orders: acc.orders,
            revenue: acc.revenue,
        })
        .collect();
    top_materials.sort_by(|a, b| b.orders.cmp(&a.orders));
    top_materials.truncate(TOP_N);

    let mut top_regions: Vec<RegionStat> = regions
        .entries
        .into_iter()
        .map(|(region, acc)| RegionStat {
            region,
            orders: acc.orders,
            customers: acc.customers.len() as u64,
        })
        .collect();
    top_regions.sort_by(|a, b| b.orders.cmp(&a.orders));
    top_regions.truncate(TOP_N);

    let deliverable = report.total_orders - report.cancelled_orders;
    report.shipping = ShippingMetrics {
        awaiting_approval: report.pending_orders,
        in_production: report.approved_orders,
        delivered: report.completed_orders,
        cancelled: report.cancelled_orders,
        delivery_rate: ratio(report.completed_orders, deliverable) * 100.0,
    };

    report.customers = CustomerMetrics {
        total_customers: report.total_customers,
        returning_customers: orders_per_customer.values().filter(|n| **n > 1).count() as u64,
        avg_orders_per_customer: ratio(report.total_orders, report.total_customers),
    };

    report.products = ProductMetrics {
        distinct_materials,
        best_seller: top_materials.first().map(|m| m.name.clone()),
        total_units,
        total_measurements,
    };
    report.top_materials = top_materials;
    report.top_regions = top_regions;
    report.emails = email_metrics(email_log);
    report.recent_orders = recent_orders(orders);

    report
}

/// Newest first; equal timestamps keep the later-listed order ahead
fn recent_orders(orders: &[Order]) -> Vec<RecentOrder> {
    let mut newest: Vec<&Order> = orders.iter().rev().collect();
    newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    newest
        .into_iter()
        .take(RECENT_ORDERS)
        .map(|order| RecentOrder {
            id: order.id,
            reference_number: order.reference_number.clone(),
            customer_name: order.customer.name.clone(),
            status: order.status,
            total_price: order.total_price,
            created_at: order.created_at,
        })
        .collect()
}

fn email_metrics(email_log: &[EmailLogEntry]) -> EmailMetrics {
    email_log
        .iter()
        .fold(EmailMetrics::default(), |mut metrics, entry| {
            match entry.status {
                EmailStatus::Sent => {
                    metrics.sent += 1;
                    match entry.audience {
                        Audience::Customer => metrics.customer_sent += 1,
                        Audience::Admin => metrics.admin_sent += 1,
                        Audience::Other => {}
                    }
                }
                EmailStatus::Failed => metrics.failed += 1,
            }
            metrics
        })
}

/// Loads the current order set and email log and aggregates them
#[derive(Clone)]
pub struct StatisticsService {
    orders: Arc<dyn OrderStore>,
    email_log: Arc<dyn EmailLogStore>,
}

impl StatisticsService {
    pub fn new(orders: Arc<dyn OrderStore>, email_log: Arc<dyn EmailLogStore>) -> Self {
        Self { orders, email_log }
    }

    #[instrument(skip(self))]
    pub async fn report(&self, filter: &OrderFilter) -> Result<StatisticsReport, ServiceError> {
        let orders = self.orders.select(filter).await?;
        let log = self.email_log.list(filter.from, filter.to).await?;
        Ok(compute_statistics(&orders, &log))
    }
}
