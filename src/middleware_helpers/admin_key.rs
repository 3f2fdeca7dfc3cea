use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::errors::ServiceError;

/// Header carrying the shared backoffice key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Shared admin key; `None` leaves the admin routes open (local development).
#[derive(Clone, Default)]
pub struct AdminKey(Option<Arc<str>>);

impl AdminKey {
    pub fn new(key: Option<String>) -> Self {
        Self(
            key.map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    fn matches(&self, candidate: &str) -> bool {
        match &self.0 {
            None => true,
            Some(expected) => {
                let expected = expected.as_bytes();
                let candidate = candidate.as_bytes();
                expected.len() == candidate.len()
                    && expected
                        .iter()
                        .zip(candidate)
                        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                        == 0
            }
        }
    }
}

/// Rejects admin requests that do not present the configured key
pub async fn require_admin_key(
    State(key): State<AdminKey>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if key.is_enabled() {
        let presented = request
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !key.matches(presented) {
            tracing::warn!(path = %request.uri().path(), "admin request rejected");
            return Err(ServiceError::Unauthorized(
                "missing or invalid admin key".to_string(),
            ));
        }
    }
    Ok(next.run(request).await)
}
