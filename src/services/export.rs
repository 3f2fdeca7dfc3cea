//! Order export for the backoffice download buttons.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::Order;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        raw.trim().parse::<ExportFormat>().map_err(|_| {
            ServiceError::ValidationError(format!(
                "Unknown export format: {raw} (expected csv or json)"
            ))
        })
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

pub const EXPORT_COLUMNS: [&str; 16] = [
    "id",
    "reference_number",
    "status",
    "created_at",
    "total_price",
    "total_units",
    "budget_number",
    "customer_name",
    "customer_tax_id",
    "customer_email",
    "customer_phone",
    "customer_address",
    "customer_region",
    "product_type",
    "notes",
    "measurements_json",
];

/// One flattened order; missing values export as empty strings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExportRow {
    pub id: String,
    pub reference_number: String,
    pub status: String,
    pub created_at: String,
    pub total_price: String,
    pub total_units: String,
    pub budget_number: String,
    pub customer_name: String,
    pub customer_tax_id: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub customer_region: String,
    pub product_type: String,
    pub notes: String,
    pub measurements_json: String,
}

impl ExportRow {
    pub fn from_order(order: &Order) -> Result<Self, ServiceError> {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Ok(Self {
            id: order.id.to_string(),
            reference_number: order.reference_number.clone(),
            status: order.status.to_string(),
            created_at: order.created_at.to_rfc3339(),
            total_price: order
                .total_price
                .map(|price| price.to_string())
                .unwrap_or_default(),
            total_units: order.total_units.to_string(),
            budget_number: text(&order.budget_number),
            customer_name: text(&order.customer.name),
            customer_tax_id: text(&order.customer.tax_id),
            customer_email: text(&order.customer.email),
            customer_phone: text(&order.customer.phone),
            customer_address: text(&order.customer.address),
            customer_region: text(&order.customer.region),
            product_type: text(&order.product_type),
            notes: text(&order.notes),
            measurements_json: serde_json::to_string(&order.measurements)?,
        })
    }

    fn fields(&self) -> [&str; 16] {
        [
            &self.id,
            &self.reference_number,
            &self.status,
            &self.created_at,
            &self.total_price,
            &self.total_units,
            &self.budget_number,
            &self.customer_name,
            &self.customer_tax_id,
            &self.customer_email,
            &self.customer_phone,
            &self.customer_address,
            &self.customer_region,
            &self.product_type,
            &self.notes,
            &self.measurements_json,
        ]
    }
}

/// A ready-to-download export
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

pub fn export_orders(
    orders: &[Order],
    format: ExportFormat,
    day: NaiveDate,
) -> Result<ExportFile, ServiceError> {
    let rows = orders
        .iter()
        .map(ExportRow::from_order)
        .collect::<Result<Vec<_>, _>>()?;

    let body = match format {
        ExportFormat::Csv => build_csv(&rows),
        ExportFormat::Json => serde_json::to_string_pretty(&rows)?,
    };

    Ok(ExportFile {
        filename: format!("orders-export-{}.{}", day.format("%Y-%m-%d"), format),
        content_type: format.content_type(),
        body,
    })
}

/// Header line first, even when there are no rows
fn build_csv(rows: &[ExportRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(EXPORT_COLUMNS.join(","));
    for row in rows {
        let escaped: Vec<String> = row.fields().iter().map(|f| escape_field(f)).collect();
        lines.push(escaped.join(","));
    }
    lines.join("\n")
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Customer, Measurement, OrderStatus};
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order() -> Order {
        Order {
            id: Uuid::nil(),
            customer: Customer {
                name: Some("Cortinas \"El Sol\", S.L.".into()),
                tax_id: Some("B12345678".into()),
                address: Some("Calle Mayor 1\n2º B".into()),
                region: Some("Madrid".into()),
                email: Some("compras@elsol.es".into()),
                phone: None,
            },
            measurements: vec![Measurement {
                width: dec!(1.5),
                height: dec!(2.2),
                quantity: 2,
                unit_price: Some(dec!(89.9)),
                product_type: Some("Screen".into()),
            }],
            product_type: Some("Screen".into()),
            total_price: Some(dec!(179.8)),
            total_units: 2,
            status: OrderStatus::Approved,
            reference_number: "CRT-20250310-0A0B0C0D".into(),
            budget_number: None,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap(),
            updated_at: None,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()
    }

    #[test]
    fn csv_quotes_fields_with_separators_and_doubles_quotes() {
        let file = export_orders(&[order()], ExportFormat::Csv, day()).unwrap();
        assert_eq!(file.filename, "orders-export-2025-03-11.csv");
        assert!(file.content_type.starts_with("text/csv"));

        let (header, row) = file.body.split_once('\n').unwrap();
        assert_eq!(header, EXPORT_COLUMNS.join(","));
        assert!(row.starts_with("00000000-0000-0000-0000-000000000000,CRT-20250310-0A0B0C0D,approved,"));
        assert!(row.contains(",179.8,2,,\"Cortinas \"\"El Sol\"\", S.L.\",B12345678,"));
        assert!(row.contains(",\"Calle Mayor 1\n2º B\",Madrid,Screen,,"));
        assert!(row.ends_with(&format!(
            ",\"{}\"",
            serde_json::to_string(&order().measurements).unwrap().replace('"', "\"\"")
        )));
    }

    #[test]
    fn empty_csv_still_has_the_header() {
        let file = export_orders(&[], ExportFormat::Csv, day()).unwrap();
        assert_eq!(file.body, EXPORT_COLUMNS.join(","));
    }

    #[test]
    fn json_export_keeps_column_names() {
        let file = export_orders(&[order()], ExportFormat::Json, day()).unwrap();
        assert_eq!(file.filename, "orders-export-2025-03-11.json");
        assert_eq!(file.content_type, "application/json");

        let rows: Vec<serde_json::Value> = serde_json::from_str(&file.body).unwrap();
        let keys: Vec<&str> = rows[0]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        for column in EXPORT_COLUMNS {
            assert!(keys.contains(&column), "missing {column}");
        }
        assert_eq!(rows[0]["customer_phone"], "");
        assert_eq!(rows[0]["status"], "approved");
    }

    #[test]
    fn format_parsing_is_case_insensitive_and_strict() {
        assert_eq!(ExportFormat::parse("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse(" json ").unwrap(), ExportFormat::Json);
        assert_matches!(
            ExportFormat::parse("xlsx"),
            Err(ServiceError::ValidationError(_))
        );
    }
}
