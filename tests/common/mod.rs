#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use curtain_quotes_api::{
    build_router,
    clock::ManualClock,
    config::AppConfig,
    handlers::AppServices,
    kv_store::InMemoryKeyValueStore,
    middleware_helpers::admin_key::{AdminKey, ADMIN_KEY_HEADER},
    models::EmailPayload,
    repositories::{InMemoryEmailLogStore, InMemoryOrderStore},
    services::email::{EmailDispatcher, EmailError},
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const ADMIN_KEY: &str = "test-backoffice-admin-key";

/// Captures outgoing emails instead of posting them
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<EmailPayload>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<EmailPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailDispatcher for RecordingDispatcher {
    async fn dispatch(&self, payload: &EmailPayload) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Application wired over in-memory stores and a manual clock.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub orders: Arc<InMemoryOrderStore>,
    pub email_log: Arc<InMemoryEmailLogStore>,
    pub outbox: Arc<RecordingDispatcher>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.admin_api_key = Some(ADMIN_KEY.to_string());
        cfg.public_base_url = "https://backoffice.test".to_string();

        let orders = Arc::new(InMemoryOrderStore::new());
        let email_log = Arc::new(InMemoryEmailLogStore::new());
        let outbox = Arc::new(RecordingDispatcher::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
        ));

        let services = AppServices::new(
            &cfg,
            orders.clone(),
            email_log.clone(),
            Arc::new(InMemoryKeyValueStore::new()),
            outbox.clone(),
            clock.clone(),
        );
        let state = AppState {
            config: Arc::new(cfg.clone()),
            services,
            order_store: orders.clone(),
            admin_key: AdminKey::new(cfg.admin_api_key.clone()),
        };

        Self {
            router: build_router(state.clone()),
            state,
            orders,
            email_log,
            outbox,
            clock,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// Admin GET that keeps headers and the body as text, for downloads
    pub async fn admin_download(&self, uri: &str) -> (StatusCode, HeaderMap, String) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(ADMIN_KEY_HEADER, ADMIN_KEY)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        (status, headers, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, body, &[(ADMIN_KEY_HEADER, ADMIN_KEY)])
            .await
    }

    pub async fn submit(&self, client: &str, form: Value) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            "/api/v1/quotes",
            Some(form),
            &[("x-client-id", client)],
        )
        .await
    }
}

pub fn quote_form(name: &str, email: &str) -> Value {
    json!({
        "customer": {
            "name": name,
            "email": email,
            "phone": "+34 600 000 000",
            "region": "Madrid"
        },
        "measurements": [
            { "width": "1.50", "height": "2.20", "quantity": 2, "unit_price": "145", "product_type": "Blackout" },
            { "width": "0.90", "height": "1.20", "quantity": 1, "unit_price": "89.5" }
        ],
        "notes": "Salón",
        "accepted_terms": true
    })
}
