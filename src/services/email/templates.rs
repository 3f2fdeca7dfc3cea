//! Built-in templates and the repository that overlays user edits on them.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::render::extract_placeholders;
use crate::errors::ServiceError;
use crate::kv_store::{self, KeyValueStore};
use crate::models::{Audience, EmailStyles, EmailTemplate};

pub const TEMPLATES_NAMESPACE: &str = "email_templates";
pub const STYLES_NAMESPACE: &str = "email_styles";
const STYLES_KEY: &str = "current";

pub const CUSTOMER_CONFIRMATION: &str = "order_confirmation_customer";
pub const ADMIN_NOTIFICATION: &str = "order_notification_admin";
pub const BUDGET: &str = "budget_customer";
pub const STATUS_UPDATE: &str = "status_update_customer";

const LAYOUT_HEAD: &str = r#"<!DOCTYPE html>
<html>
<body style="margin:0;padding:0;background:#f4f4f4;font-family:{{font_family}};">
<table width="100%" cellpadding="0" cellspacing="0"><tr><td align="center">
<table width="600" cellpadding="24" cellspacing="0" style="background:#ffffff;">
<tr><td style="background:{{primary_color}};color:#ffffff;">
<img src="{{logo_url}}" alt="" style="max-height:48px;"/>
<h1 style="margin:0;font-size:22px;">{{business_name}}</h1>
</td></tr>
<tr><td>"#;

const LAYOUT_FOOT: &str = r#"</td></tr>
<tr><td style="color:#777777;font-size:12px;border-top:3px solid {{accent_color}};">{{footer_text}}</td></tr>
</table>
</td></tr></table>
</body>
</html>"#;

const MEASUREMENTS_BLOCK: &str = r#"<table width="100%" cellpadding="4" cellspacing="0" style="border-collapse:collapse;">
<tr style="background:{{accent_color}};"><th>#</th><th>Ancho</th><th>Alto</th><th>Cant.</th><th>Tipo</th><th>Precio unitario</th></tr>
{{measurements_table}}
</table>"#;

fn wrap(body: &str) -> String {
    format!("{LAYOUT_HEAD}\n{body}\n{LAYOUT_FOOT}")
}

fn builtin(id: &str, name: &str, audience: Audience, subject: &str, body: &str) -> EmailTemplate {
    let html = wrap(body);
    let variables = extract_placeholders(&format!("{subject}\n{html}"));
    EmailTemplate {
        id: id.to_string(),
        name: name.to_string(),
        audience,
        subject: subject.to_string(),
        html,
        variables,
        updated_at: None,
    }
}

/// Templates that exist before anyone edits anything
pub fn default_templates() -> Vec<EmailTemplate> {
    vec![
        builtin(
            CUSTOMER_CONFIRMATION,
            "Confirmación de solicitud",
            Audience::Customer,
            "Hemos recibido tu solicitud {{reference_number}}",
            &format!(
                r#"<p>Hola {{{{customer_name}}}},</p>
<p>Gracias por solicitar tu presupuesto. Tu número de referencia es <strong>{{{{reference_number}}}}</strong> ({{{{created_at}}}}).</p>
{MEASUREMENTS_BLOCK}
<p>Total estimado: <strong>{{{{total_price}}}}</strong> por {{{{total_units}}}} unidades (IVA incluido).</p>
<p>Te contactaremos en breve. ¿Dudas? Escríbenos a {{{{support_email}}}} o llámanos al {{{{support_phone}}}}. {{{{website}}}}</p>"#
            ),
        ),
        builtin(
            ADMIN_NOTIFICATION,
            "Nueva solicitud (interno)",
            Audience::Admin,
            "Nueva solicitud {{reference_number}} de {{customer_name}}",
            &format!(
                r#"<p>Nueva solicitud de presupuesto <strong>{{{{reference_number}}}}</strong> recibida el {{{{created_at}}}}.</p>
<ul>
<li>Nombre / razón social: {{{{customer_name}}}}</li>
<li>CIF/NIF: {{{{customer_tax_id}}}}</li>
<li>Email: {{{{customer_email}}}}</li>
<li>Teléfono: {{{{customer_phone}}}}</li>
<li>Dirección: {{{{customer_address}}}} ({{{{customer_region}}}})</li>
<li>Producto: {{{{product_type}}}}</li>
</ul>
{MEASUREMENTS_BLOCK}
<p>Total: {{{{total_price}}}} / {{{{total_units}}}} unidades</p>
<p>Notas: {{{{notes}}}}</p>
<p>{{{{internal_contact}}}}</p>
<p><a href="{{{{admin_panel_url}}}}">Abrir en el backoffice</a></p>"#
            ),
        ),
        builtin(
            BUDGET,
            "Presupuesto",
            Audience::Customer,
            "Presupuesto {{budget_number}} para tu pedido de cortinas {{reference_number}}",
            &format!(
                r#"<p>Hola {{{{customer_name}}}},</p>
<p>Te enviamos el presupuesto <strong>{{{{budget_number}}}}</strong> de tu solicitud {{{{reference_number}}}}.</p>
{MEASUREMENTS_BLOCK}
<p>Total: <strong>{{{{budget_total}}}}</strong> (IVA incluido)</p>
<p>{{{{budget_message}}}}</p>
<p>Para confirmarlo, responde a este correo o escríbenos a {{{{support_email}}}}.</p>"#
            ),
        ),
        builtin(
            STATUS_UPDATE,
            "Cambio de estado",
            Audience::Customer,
            "Tu solicitud {{reference_number}} está {{status_label}}",
            r#"<p>Hola {{customer_name}},</p>
<p>El estado de tu solicitud <strong>{{reference_number}}</strong> ha cambiado a <strong>{{status_label}}</strong>.</p>
<p>¿Dudas? Escríbenos a {{support_email}}.</p>"#,
        ),
    ]
}

/// Edit submitted from the template editor
#[derive(Clone, Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct TemplateUpdate {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub audience: Option<Audience>,
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub html: String,
}

/// Default templates overlaid by edits kept in the key-value store
#[derive(Clone)]
pub struct TemplateRepository {
    store: Arc<dyn KeyValueStore>,
    defaults: Arc<Vec<EmailTemplate>>,
}

impl TemplateRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            defaults: Arc::new(default_templates()),
        }
    }

    fn default_for(&self, id: &str) -> Option<&EmailTemplate> {
        self.defaults.iter().find(|t| t.id == id)
    }

    async fn stored(&self, id: &str) -> Result<Option<EmailTemplate>, ServiceError> {
        match kv_store::get_json::<EmailTemplate>(self.store.as_ref(), TEMPLATES_NAMESPACE, id)
            .await
        {
            Ok(found) => Ok(found),
            Err(kv_store::KeyValueError::Serialization(e)) => {
                warn!(template_id = id, error = %e, "ignoring unreadable stored template");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Defaults first (edited or not), then templates that only exist as edits
    pub async fn list(&self) -> Result<Vec<EmailTemplate>, ServiceError> {
        let stored = self.store.list(TEMPLATES_NAMESPACE).await?;
        let mut edits: Vec<EmailTemplate> = stored
            .into_iter()
            .filter_map(|(id, raw)| match serde_json::from_str::<EmailTemplate>(&raw) {
                Ok(template) => Some(template),
                Err(e) => {
                    warn!(template_id = %id, error = %e, "ignoring unreadable stored template");
                    None
                }
            })
            .collect();

        let mut templates = Vec::with_capacity(self.defaults.len() + edits.len());
        for default in self.defaults.iter() {
            match edits.iter().position(|t| t.id == default.id) {
                Some(idx) => templates.push(edits.remove(idx)),
                None => templates.push(default.clone()),
            }
        }
        templates.extend(edits);
        Ok(templates)
    }

    pub async fn get(&self, id: &str) -> Result<Option<EmailTemplate>, ServiceError> {
        match self.stored(id).await? {
            Some(template) => Ok(Some(template)),
            None => Ok(self.default_for(id).cloned()),
        }
    }

    pub async fn require(&self, id: &str) -> Result<EmailTemplate, ServiceError> {
        self.get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Email template {} not found", id)))
    }

    /// Stores an edit; declared variables are recomputed from the new text
    pub async fn save(&self, id: &str, update: TemplateUpdate) -> Result<EmailTemplate, ServiceError> {
        update.validate()?;
        let id = id.trim();
        if id.is_empty() {
            return Err(ServiceError::ValidationError(
                "template id must not be empty".to_string(),
            ));
        }

        let base = self.get(id).await?;
        let name = update
            .name
            .or_else(|| base.as_ref().map(|t| t.name.clone()))
            .unwrap_or_else(|| id.to_string());
        let audience = update
            .audience
            .or_else(|| base.as_ref().map(|t| t.audience))
            .unwrap_or(Audience::Other);

        let template = EmailTemplate {
            id: id.to_string(),
            name,
            audience,
            variables: extract_placeholders(&format!("{}\n{}", update.subject, update.html)),
            subject: update.subject,
            html: update.html,
            updated_at: Some(Utc::now()),
        };
        kv_store::set_json(self.store.as_ref(), TEMPLATES_NAMESPACE, id, &template).await?;
        info!(template_id = id, "email template saved");
        Ok(template)
    }

    /// Drops the stored edit. Built-in templates fall back to their default;
    /// custom templates disappear.
    pub async fn reset(&self, id: &str) -> Result<Option<EmailTemplate>, ServiceError> {
        let removed = self.store.remove(TEMPLATES_NAMESPACE, id).await?;
        match self.default_for(id) {
            Some(default) => Ok(Some(default.clone())),
            None if removed => Ok(None),
            None => Err(ServiceError::NotFound(format!(
                "Email template {} not found",
                id
            ))),
        }
    }

    pub async fn styles(&self) -> Result<EmailStyles, ServiceError> {
        match kv_store::get_json::<EmailStyles>(self.store.as_ref(), STYLES_NAMESPACE, STYLES_KEY)
            .await
        {
            Ok(found) => Ok(found.unwrap_or_default()),
            Err(kv_store::KeyValueError::Serialization(e)) => {
                warn!(error = %e, "ignoring unreadable stored email styles");
                Ok(EmailStyles::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_styles(&self, styles: EmailStyles) -> Result<EmailStyles, ServiceError> {
        kv_store::set_json(self.store.as_ref(), STYLES_NAMESPACE, STYLES_KEY, &styles).await?;
        Ok(styles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKeyValueStore;
    use assert_matches::assert_matches;

    fn repo() -> TemplateRepository {
        TemplateRepository::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    fn update(subject: &str, html: &str) -> TemplateUpdate {
        TemplateUpdate {
            name: None,
            audience: None,
            subject: subject.into(),
            html: html.into(),
        }
    }

    #[test]
    fn defaults_declare_their_tokens() {
        let defaults = default_templates();
        let customer = defaults
            .iter()
            .find(|t| t.id == CUSTOMER_CONFIRMATION)
            .unwrap();
        assert!(customer.variables.contains(&"reference_number".to_string()));
        assert!(customer.variables.contains(&"measurements_table".to_string()));
        assert!(customer.html.contains("{{support_email}}"));
        assert!(!customer.html.contains("{{{{"));

        let admin = defaults.iter().find(|t| t.id == ADMIN_NOTIFICATION).unwrap();
        assert_eq!(admin.audience, Audience::Admin);
        assert!(admin.variables.contains(&"admin_panel_url".to_string()));
    }

    #[tokio::test]
    async fn edits_overlay_defaults_and_reset_restores_them() {
        let repo = repo();
        let saved = repo
            .save(CUSTOMER_CONFIRMATION, update("Hola {{customer_name}}", "<p>{{reference_number}}</p>"))
            .await
            .unwrap();
        assert_eq!(saved.name, "Confirmación de solicitud");
        assert_eq!(saved.audience, Audience::Customer);
        assert_eq!(saved.variables, vec!["customer_name", "reference_number"]);
        assert!(saved.updated_at.is_some());

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), default_templates().len());
        assert_eq!(listed[0].subject, "Hola {{customer_name}}");

        let restored = repo.reset(CUSTOMER_CONFIRMATION).await.unwrap().unwrap();
        assert!(restored.updated_at.is_none());
        assert_eq!(
            repo.get(CUSTOMER_CONFIRMATION).await.unwrap().unwrap().subject,
            "Hemos recibido tu solicitud {{reference_number}}"
        );
    }

    #[tokio::test]
    async fn custom_templates_are_listed_after_defaults_and_can_be_removed() {
        let repo = repo();
        repo.save("promo", update("Promo", "<p>{{customer_name}}</p>"))
            .await
            .unwrap();
        let listed = repo.list().await.unwrap();
        assert_eq!(listed.last().unwrap().id, "promo");
        assert_eq!(listed.last().unwrap().audience, Audience::Other);

        assert!(repo.reset("promo").await.unwrap().is_none());
        assert_matches!(repo.reset("promo").await, Err(ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let repo = repo();
        assert_matches!(
            repo.save(BUDGET, update("", "<p></p>")).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn styles_default_until_saved() {
        let repo = repo();
        assert_eq!(repo.styles().await.unwrap(), EmailStyles::default());
        let custom = EmailStyles {
            primary_color: "#101010".into(),
            ..Default::default()
        };
        repo.save_styles(custom.clone()).await.unwrap();
        assert_eq!(repo.styles().await.unwrap(), custom);
    }
}
