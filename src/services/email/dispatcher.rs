use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::models::EmailPayload;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email delivery is not configured")]
    Disabled,
    #[error("email endpoint unreachable: {0}")]
    Transport(String),
    #[error("email endpoint rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<EmailError> for ServiceError {
    fn from(err: EmailError) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

/// Hands a finished email to whatever delivers it
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn dispatch(&self, payload: &EmailPayload) -> Result<(), EmailError>;
}

#[derive(Debug, Deserialize)]
struct EndpointErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Posts `{to, subject, html, template, data}` as JSON. No retries.
#[derive(Clone)]
pub struct HttpEmailDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmailDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EmailDispatcher for HttpEmailDispatcher {
    #[instrument(skip(self, payload), fields(template = %payload.template))]
    async fn dispatch(&self, payload: &EmailPayload) -> Result<(), EmailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "email endpoint request failed");
                EmailError::Transport(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            info!(status = status.as_u16(), "email accepted by endpoint");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<EndpointErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.error.or(parsed.message))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
        warn!(status = status.as_u16(), %message, "email endpoint rejected message");
        Err(EmailError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Used when no endpoint is configured; every dispatch fails as `Disabled`
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEmailDispatcher;

#[async_trait]
impl EmailDispatcher for DisabledEmailDispatcher {
    async fn dispatch(&self, payload: &EmailPayload) -> Result<(), EmailError> {
        warn!(template = %payload.template, "email delivery disabled, message dropped");
        Err(EmailError::Disabled)
    }
}
