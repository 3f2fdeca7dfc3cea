use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::email_log;
use crate::errors::ServiceError;

/// Who an email template is written for
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
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Audience {
    Customer,
    Admin,
    Other,
}

/// An editable email template.
///
/// `subject` and `html` carry `{{token}}` placeholders; `variables` lists
/// the tokens the template declares. Built-in defaults have no `updated_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub audience: Audience,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Brand settings exposed to every template as tokens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct EmailStyles {
    pub primary_color: String,
    pub accent_color: String,
    pub font_family: String,
    pub logo_url: Option<String>,
    pub footer_text: String,
}

impl Default for EmailStyles {
    fn default() -> Self {
        Self {
            primary_color: "#2f4858".to_string(),
            accent_color: "#c8a96a".to_string(),
            font_family: "Helvetica, Arial, sans-serif".to_string(),
            logo_url: None,
            footer_text: "Gracias por confiar en nosotros.".to_string(),
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmailStatus {
    Sent,
    Failed,
}

/// One recorded delivery attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailLogEntry {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub template_id: String,
    pub audience: Audience,
    pub recipient: String,
    pub subject: String,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<email_log::Model> for EmailLogEntry {
    type Error = ServiceError;

    fn try_from(model: email_log::Model) -> Result<Self, Self::Error> {
        let audience = model.audience.parse::<Audience>().map_err(|_| {
            ServiceError::InternalError(format!("unknown email audience {}", model.audience))
        })?;
        let status = model.status.parse::<EmailStatus>().map_err(|_| {
            ServiceError::InternalError(format!("unknown email status {}", model.status))
        })?;
        Ok(Self {
            id: model.id,
            order_id: model.order_id,
            template_id: model.template_id,
            audience,
            recipient: model.recipient,
            subject: model.subject,
            status,
            error: model.error,
            created_at: model.created_at,
        })
    }
}

/// Body posted to the outbound email endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub template: String,
    pub data: serde_json::Value,
}
