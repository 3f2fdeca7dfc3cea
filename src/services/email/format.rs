//! Locale formatting applied before substitution: decimal comma, dot
//! thousands separator, `dd/mm/yyyy` dates.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::OrderStatus;

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}

/// `1234.5` -> `1.234,50`
pub fn format_number(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let plain = format!("{:.*}", decimals as usize, rounded.abs());
    let (int_part, frac_part) = match plain.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (plain.as_str(), None),
    };

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(frac);
    }
    out
}

/// `1234.5` -> `1.234,50 €`
pub fn format_currency(value: Decimal) -> String {
    format!("{} €", format_number(value, 2))
}

/// Measurement values keep two decimals without grouping: `1.5` -> `1,50`
pub fn format_measure(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded).replace('.', ",")
}

pub fn format_date(value: DateTime<Utc>) -> String {
    value.format("%d/%m/%Y").to_string()
}

/// Customer-facing name of a status
pub fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pendiente de revisión",
        OrderStatus::Approved => "aprobada",
        OrderStatus::Rejected => "rechazada",
        OrderStatus::Completed => "completada",
    }
}

/// Escapes text taken from customer input before it lands in HTML
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn currency_uses_decimal_comma_and_dot_grouping() {
        assert_eq!(format_currency(dec!(1234.5)), "1.234,50 €");
        assert_eq!(format_currency(dec!(0)), "0,00 €");
        assert_eq!(format_currency(dec!(999)), "999,00 €");
        assert_eq!(format_currency(dec!(1000000)), "1.000.000,00 €");
        assert_eq!(format_currency(dec!(12.345)), "12,35 €");
        assert_eq!(format_currency(dec!(-1500.1)), "-1.500,10 €");
    }

    #[test]
    fn measures_have_two_decimals() {
        assert_eq!(format_measure(dec!(1.5)), "1,50");
        assert_eq!(format_measure(dec!(2)), "2,00");
        assert_eq!(format_measure(dec!(1250.256)), "1250,26");
    }

    #[test]
    fn dates_are_day_first() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 22, 15, 0).unwrap();
        assert_eq!(format_date(at), "07/03/2025");
    }

    #[test]
    fn status_labels_are_spanish() {
        assert_eq!(status_label(OrderStatus::Approved), "aprobada");
        assert_eq!(status_label(OrderStatus::Pending), "pendiente de revisión");
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(
            escape_html(r#"<b>"Ana" & 'Co'</b>"#),
            "&lt;b&gt;&quot;Ana&quot; &amp; &#39;Co&#39;&lt;/b&gt;"
        );
    }
}
