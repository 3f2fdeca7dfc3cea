use chrono::{DateTime, Utc};
use uuid::Uuid;

const REFERENCE_PREFIX: &str = "CRT";
const BUDGET_PREFIX: &str = "PRES";

/// Issues the human-facing identifiers printed on quotes.
///
/// Both formats are `<PREFIX>-YYYYMMDD-XXXXXXXX`, the suffix being the first
/// eight hex digits of a v4 UUID in upper case. The `reference_number`
/// column is unique, so a collision surfaces as a conflict instead of a
/// silently shared reference.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceGenerator;

impl ReferenceGenerator {
    pub fn reference_number(&self, at: DateTime<Utc>) -> String {
        Self::issue(REFERENCE_PREFIX, at)
    }

    pub fn budget_number(&self, at: DateTime<Utc>) -> String {
        Self::issue(BUDGET_PREFIX, at)
    }

    fn issue(prefix: &str, at: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            prefix,
            at.format("%Y%m%d"),
            suffix[..8].to_ascii_uppercase()
        )
    }
}
