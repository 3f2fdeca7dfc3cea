//! Audience projections of an order into template tokens.

use rust_decimal::Decimal;

use super::format::{escape_html, format_currency, format_date, format_measure, status_label};
use super::render::TemplateContext;
use crate::config::AppConfig;
use crate::models::{Audience, EmailStyles, Measurement, Order};

/// Business details printed in emails
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusinessProfile {
    pub business_name: String,
    pub support_email: String,
    pub support_phone: Option<String>,
    pub website: Option<String>,
    pub admin_recipient: String,
    /// Backoffice base URL; order links are `<base>/admin/orders/<id>`
    pub admin_base_url: String,
}

impl From<&AppConfig> for BusinessProfile {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            business_name: cfg.email.business_name.clone(),
            support_email: cfg.email.support_email.clone(),
            support_phone: cfg.email.support_phone.clone(),
            website: cfg.email.website.clone(),
            admin_recipient: cfg.email.admin_recipient.clone(),
            admin_base_url: cfg.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl BusinessProfile {
    pub fn admin_order_url(&self, order: &Order) -> String {
        format!("{}/admin/orders/{}", self.admin_base_url, order.id)
    }
}

fn text(value: Option<&str>) -> String {
    value.map(|v| escape_html(v.trim())).unwrap_or_default()
}

fn measurement_row(index: usize, line: &Measurement, fallback_type: &str) -> String {
    let product = line
        .product_type
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(escape_html)
        .unwrap_or_else(|| fallback_type.to_string());
    format!(
        "<tr><td>{}</td><td>{} m</td><td>{} m</td><td>{}</td><td>{}</td><td>{}</td></tr>",
        index + 1,
        format_measure(line.width),
        format_measure(line.height),
        line.quantity,
        product,
        format_currency(line.unit_price.unwrap_or_default()),
    )
}

pub fn measurements_table(order: &Order) -> String {
    let fallback = text(order.product_type.as_deref());
    order
        .measurements
        .iter()
        .enumerate()
        .map(|(i, line)| measurement_row(i, line, &fallback))
        .collect::<Vec<_>>()
        .join("\n")
}

fn style_tokens(ctx: &mut TemplateContext, styles: &EmailStyles) {
    ctx.insert("primary_color", styles.primary_color.as_str())
        .insert("accent_color", styles.accent_color.as_str())
        .insert("font_family", styles.font_family.as_str())
        .insert("logo_url", styles.logo_url.clone().unwrap_or_default())
        .insert("footer_text", escape_html(&styles.footer_text));
}

/// Tokens shared by every audience
pub fn order_context(
    order: &Order,
    profile: &BusinessProfile,
    styles: &EmailStyles,
) -> TemplateContext {
    let customer = &order.customer;
    let mut ctx = TemplateContext::new();
    ctx.insert("reference_number", order.reference_number.as_str())
        .insert("budget_number", order.budget_number.clone().unwrap_or_default())
        .insert("customer_name", text(customer.name.as_deref()))
        .insert("customer_email", text(customer.email.as_deref()))
        .insert("customer_phone", text(customer.phone.as_deref()))
        .insert("customer_address", text(customer.address.as_deref()))
        .insert("customer_region", text(customer.region.as_deref()))
        .insert("customer_tax_id", text(customer.tax_id.as_deref()))
        .insert("product_type", text(order.product_type.as_deref()))
        .insert(
            "total_price",
            format_currency(order.total_price.unwrap_or(Decimal::ZERO)),
        )
        .insert("total_units", order.total_units.to_string())
        .insert("measurements_count", order.measurements.len().to_string())
        .insert("measurements_table", measurements_table(order))
        .insert("notes", text(order.notes.as_deref()))
        .insert("status", order.status.as_str())
        .insert("status_label", status_label(order.status))
        .insert("created_at", format_date(order.created_at))
        .insert("business_name", escape_html(&profile.business_name));
    style_tokens(&mut ctx, styles);
    ctx
}

/// Customer projection: order data plus how to reach the business
pub fn customer_context(
    order: &Order,
    profile: &BusinessProfile,
    styles: &EmailStyles,
) -> TemplateContext {
    let mut ctx = order_context(order, profile, styles);
    ctx.insert("support_email", profile.support_email.as_str())
        .insert("support_phone", profile.support_phone.clone().unwrap_or_default())
        .insert("website", profile.website.clone().unwrap_or_default());
    ctx
}

/// Admin projection: order data plus internal routing
pub fn admin_context(
    order: &Order,
    profile: &BusinessProfile,
    styles: &EmailStyles,
) -> TemplateContext {
    let mut ctx = order_context(order, profile, styles);
    let reach = [order.customer.email.as_deref(), order.customer.phone.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(escape_html)
        .collect::<Vec<_>>();
    let internal_contact = if reach.is_empty() {
        "Sin datos de contacto".to_string()
    } else {
        format!("Responder al cliente en {}", reach.join(" / "))
    };
    ctx.insert("admin_panel_url", profile.admin_order_url(order))
        .insert("internal_contact", internal_contact)
        .insert("admin_recipient", profile.admin_recipient.as_str());
    ctx
}

pub fn context_for(
    audience: Audience,
    order: &Order,
    profile: &BusinessProfile,
    styles: &EmailStyles,
) -> TemplateContext {
    match audience {
        Audience::Customer => customer_context(order, profile, styles),
        Audience::Admin => admin_context(order, profile, styles),
        Audience::Other => order_context(order, profile, styles),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Customer, OrderStatus};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    pub(crate) fn profile() -> BusinessProfile {
        BusinessProfile {
            business_name: "Cortinas a Medida".into(),
            support_email: "contacto@example.com".into(),
            support_phone: Some("+34 910 000 000".into()),
            website: Some("https://cortinas.example.com".into()),
            admin_recipient: "ventas@example.com".into(),
            admin_base_url: "https://admin.example.com".into(),
        }
    }

    pub(crate) fn order() -> Order {
        Order {
            id: Uuid::nil(),
            customer: Customer {
                name: Some("<Ana>".into()),
                email: Some("ana@example.com".into()),
                phone: Some("+34 600 123 456".into()),
                ..Default::default()
            },
            measurements: vec![Measurement {
                width: dec!(1.5),
                height: dec!(2.2),
                quantity: 2,
                unit_price: Some(dec!(1234.5)),
                product_type: None,
            }],
            product_type: Some("Blackout".into()),
            total_price: Some(dec!(2469)),
            total_units: 2,
            status: OrderStatus::Pending,
            reference_number: "CRT-20250307-ABCDEF01".into(),
            budget_number: None,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn customer_projection_has_contact_block_but_no_internal_routing() {
        let ctx = customer_context(&order(), &profile(), &EmailStyles::default());
        assert_eq!(ctx.get("support_email"), Some("contacto@example.com"));
        assert_eq!(ctx.get("customer_name"), Some("&lt;Ana&gt;"));
        assert_eq!(ctx.get("total_price"), Some("2.469,00 €"));
        assert_eq!(ctx.get("created_at"), Some("07/03/2025"));
        assert!(!ctx.contains("admin_panel_url"));
        assert!(!ctx.contains("internal_contact"));
    }

    #[test]
    fn admin_projection_links_to_backoffice() {
        let ctx = admin_context(&order(), &profile(), &EmailStyles::default());
        assert_eq!(
            ctx.get("admin_panel_url"),
            Some("https://admin.example.com/admin/orders/00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(
            ctx.get("internal_contact"),
            Some("Responder al cliente en ana@example.com / +34 600 123 456")
        );
        assert!(!ctx.contains("support_email"));
    }

    #[test]
    fn measurement_rows_use_locale_numbers() {
        let table = measurements_table(&order());
        assert_eq!(
            table,
            "<tr><td>1</td><td>1,50 m</td><td>2,20 m</td><td>2</td><td>Blackout</td><td>1.234,50 €</td></tr>"
        );
    }

    #[test]
    fn missing_values_degrade_to_defaults() {
        let mut bare = order();
        bare.customer = Customer::default();
        bare.total_price = None;
        let ctx = admin_context(&bare, &profile(), &EmailStyles::default());
        assert_eq!(ctx.get("customer_name"), Some(""));
        assert_eq!(ctx.get("total_price"), Some("0,00 €"));
        assert_eq!(ctx.get("internal_contact"), Some("Sin datos de contacto"));
    }
}
