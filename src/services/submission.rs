//! Public quote submission.
//!
//! Each client key owns a [`SubmissionFlow`] moving through
//! `Idle -> Submitting -> Success | Error`. Guards run in order: a flow
//! already submitting is refused untouched, then terms acceptance, the
//! per-client throttle and field validation. Only an accepted form reaches
//! the store, and only a stored order records the client's timestamp.

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::clock::Clock;
use crate::errors::ServiceError;
use crate::kv_store::{self, KeyValueStore};
use crate::models::{Customer, Measurement, NewOrder, Order, OrderStatus};
use crate::repositories::OrderStore;
use crate::services::email::{ConfirmationEmails, EmailService};

pub const THROTTLE_NAMESPACE: &str = "submission_throttle";
pub const TERMS_MESSAGE: &str = "You must accept the terms and conditions to submit your request.";
pub const FALLBACK_MESSAGE: &str =
    "We could not send your request. Please try again in a few minutes.";
const REVIEW_MESSAGE: &str = "Please review the highlighted fields.";

pub const MAX_DIMENSION_METERS: i64 = 100;
pub const MAX_PRICE: i64 = 1_000_000_000;
pub const MAX_MEASUREMENTS: usize = 200;
pub const MAX_TOTAL_UNITS: u32 = 1_000_000;
/// Settled flows untouched for this long are forgotten
pub const FLOW_RETENTION_MINUTES: i64 = 15;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Submitting,
    Success { reference_number: String },
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("A request is already being sent")]
    AlreadySubmitting,
    #[error("{}", TERMS_MESSAGE)]
    TermsNotAccepted,
    #[error("Please wait {retry_after_secs} seconds before sending another request.")]
    Throttled { retry_after_secs: u64 },
    #[error("{message}")]
    Invalid {
        message: String,
        errors: Vec<String>,
    },
    #[error("{message}")]
    Store {
        message: String,
        #[source]
        source: ServiceError,
    },
}

impl SubmissionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadySubmitting => StatusCode::CONFLICT,
            Self::TermsNotAccepted | Self::Invalid { .. } => StatusCode::BAD_REQUEST,
            Self::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Store { source, .. } => source.status_code(),
        }
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn dimension(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        Err(invalid("positive", "must be greater than zero"))
    } else if *value > Decimal::from(MAX_DIMENSION_METERS) {
        Err(invalid("max_dimension", "must be at most 100 meters"))
    } else {
        Ok(())
    }
}

fn price(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        Err(invalid("non_negative", "must not be negative"))
    } else if *value > Decimal::from(MAX_PRICE) {
        Err(invalid("max_price", "must not exceed 1000000000"))
    } else {
        Ok(())
    }
}

fn totals_too_large() -> SubmissionError {
    SubmissionError::Invalid {
        message: REVIEW_MESSAGE.to_string(),
        errors: vec!["measurements: totals are too large".to_string()],
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerForm {
    #[validate(required, length(min = 1, max = 120, message = "Name is required"))]
    pub name: Option<String>,
    #[validate(length(max = 32))]
    pub tax_id: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 120))]
    pub region: Option<String>,
    #[validate(email(message = "Email address is not valid"))]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct MeasurementForm {
    #[validate(custom = "dimension")]
    pub width: Decimal,
    #[validate(custom = "dimension")]
    pub height: Decimal,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    #[validate(custom = "price")]
    pub unit_price: Option<Decimal>,
    pub product_type: Option<String>,
}

/// What the wizard posts
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct QuoteForm {
    #[validate]
    #[serde(default)]
    pub customer: CustomerForm,
    #[validate]
    #[serde(default)]
    pub measurements: Vec<MeasurementForm>,
    pub product_type: Option<String>,
    #[validate(custom = "price")]
    pub total_price: Option<Decimal>,
    pub total_units: Option<u32>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub accepted_terms: bool,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl QuoteForm {
    /// Trims every text field and turns blanks into `None`
    pub fn normalized(self) -> Self {
        Self {
            customer: CustomerForm {
                name: clean(self.customer.name),
                tax_id: clean(self.customer.tax_id),
                address: clean(self.customer.address),
                region: clean(self.customer.region),
                email: clean(self.customer.email).map(|e| e.to_lowercase()),
                phone: clean(self.customer.phone),
            },
            measurements: self
                .measurements
                .into_iter()
                .map(|m| MeasurementForm {
                    product_type: clean(m.product_type),
                    ..m
                })
                .collect(),
            product_type: clean(self.product_type),
            notes: clean(self.notes),
            ..self
        }
    }

    fn check(&self) -> Result<(), SubmissionError> {
        let mut errors: Vec<String> = Vec::new();
        if let Err(e) = self.validate() {
            errors.extend(flatten_validation(&e));
        }
        if self.measurements.is_empty() {
            errors.push("measurements: at least one measurement is required".to_string());
        }
        if self.measurements.len() > MAX_MEASUREMENTS {
            errors.push(format!(
                "measurements: at most {MAX_MEASUREMENTS} measurements are allowed"
            ));
        }
        if self.total_units.is_some_and(|units| units > MAX_TOTAL_UNITS) {
            errors.push(format!("total_units: must be at most {MAX_TOTAL_UNITS}"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SubmissionError::Invalid {
                message: REVIEW_MESSAGE.to_string(),
                errors,
            })
        }
    }

    /// Order payload; totals are derived from the lines when not given.
    /// Derived totals that leave `Decimal` or `u32` range are rejected.
    pub fn into_new_order(self) -> Result<NewOrder, SubmissionError> {
        let measurements: Vec<Measurement> = self
            .measurements
            .into_iter()
            .map(|m| Measurement {
                width: m.width,
                height: m.height,
                quantity: m.quantity,
                unit_price: m.unit_price,
                product_type: m.product_type,
            })
            .collect();

        let priced = measurements.iter().any(|m| m.unit_price.is_some());
        let total_price = match self.total_price {
            Some(total) => Some(total),
            None if priced => Some(
                measurements
                    .iter()
                    .try_fold(Decimal::ZERO, |acc, m| {
                        m.line_total().and_then(|line| acc.checked_add(line))
                    })
                    .ok_or_else(totals_too_large)?,
            ),
            None => None,
        };
        let total_units = match self.total_units {
            Some(units) => units,
            None => measurements
                .iter()
                .try_fold(0u32, |acc, m| acc.checked_add(m.quantity))
                .ok_or_else(totals_too_large)?,
        };
        let product_type = self
            .product_type
            .or_else(|| measurements.iter().find_map(|m| m.product_type.clone()));

        Ok(NewOrder {
            customer: Customer {
                name: self.customer.name,
                tax_id: self.customer.tax_id,
                address: self.customer.address,
                region: self.customer.region,
                email: self.customer.email,
                phone: self.customer.phone,
            },
            measurements,
            product_type,
            total_price,
            total_units,
            notes: self.notes,
        })
    }
}

fn flatten_validation(errors: &validator::ValidationErrors) -> Vec<String> {
    use validator::ValidationErrorsKind;

    let mut out = Vec::new();
    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    out.push(format!("{field}: {message}"));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                out.extend(
                    flatten_validation(inner)
                        .into_iter()
                        .map(|e| format!("{field}.{e}")),
                );
            }
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    out.extend(
                        flatten_validation(inner)
                            .into_iter()
                            .map(|e| format!("{field}[{index}].{e}")),
                    );
                }
            }
        }
    }
    out.sort();
    out
}

/// Returned to the client after a stored submission. The confirmations are
/// rendered but not delivered here.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmissionReceipt {
    pub order_id: Uuid,
    pub reference_number: String,
    pub emails: Option<ConfirmationEmails>,
}

#[derive(Debug)]
struct FlowSlot {
    state: SubmissionState,
    changed_at: DateTime<Utc>,
}

/// State of one client's submissions
#[derive(Debug)]
pub struct SubmissionFlow {
    slot: Mutex<FlowSlot>,
}

impl SubmissionFlow {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            slot: Mutex::new(FlowSlot {
                state: SubmissionState::Idle,
                changed_at: now,
            }),
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state.clone()
    }

    /// Back to `Idle`. A flow that is mid-submission is left alone.
    pub fn reset(&self, now: DateTime<Utc>) -> SubmissionState {
        let mut slot = self.lock();
        if slot.state != SubmissionState::Submitting {
            slot.state = SubmissionState::Idle;
            slot.changed_at = now;
        }
        slot.state.clone()
    }

    /// Moves to `Submitting`. The returned guard must be settled; dropping it
    /// unsettled leaves the flow in the fallback error instead.
    fn begin(self: &Arc<Self>, now: DateTime<Utc>) -> Result<InFlight, SubmissionError> {
        let mut slot = self.lock();
        if slot.state == SubmissionState::Submitting {
            return Err(SubmissionError::AlreadySubmitting);
        }
        slot.state = SubmissionState::Submitting;
        slot.changed_at = now;
        Ok(InFlight {
            flow: Arc::clone(self),
            started_at: now,
            settled: false,
        })
    }

    fn set(&self, state: SubmissionState, now: DateTime<Utc>) {
        let mut slot = self.lock();
        slot.state = state;
        slot.changed_at = now;
    }

    fn is_stale(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let slot = self.lock();
        slot.state != SubmissionState::Submitting && now - slot.changed_at >= retention
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FlowSlot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A submission in progress
#[derive(Debug)]
struct InFlight {
    flow: Arc<SubmissionFlow>,
    started_at: DateTime<Utc>,
    settled: bool,
}

impl InFlight {
    fn settle(mut self, outcome: &Result<SubmissionReceipt, SubmissionError>, now: DateTime<Utc>) {
        let state = match outcome {
            Ok(receipt) => SubmissionState::Success {
                reference_number: receipt.reference_number.clone(),
            },
            Err(e) => SubmissionState::Error {
                message: e.to_string(),
            },
        };
        self.flow.set(state, now);
        self.settled = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            warn!("submission abandoned before it completed");
            self.flow.set(
                SubmissionState::Error {
                    message: FALLBACK_MESSAGE.to_string(),
                },
                self.started_at,
            );
        }
    }
}

#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn OrderStore>,
    client_state: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    email: EmailService,
    throttle: Duration,
    notify_on_submission: bool,
    flows: Arc<DashMap<String, Arc<SubmissionFlow>>>,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        client_state: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        email: EmailService,
        throttle: std::time::Duration,
    ) -> Self {
        Self {
            store,
            client_state,
            clock,
            email,
            throttle: Duration::from_std(throttle).unwrap_or_else(|_| Duration::seconds(30)),
            notify_on_submission: false,
            flows: Arc::new(DashMap::new()),
        }
    }

    /// Also deliver the confirmations in the background after each stored order
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_submission = enabled;
        self
    }

    pub fn flow(&self, client_key: &str) -> Arc<SubmissionFlow> {
        let now = self.clock.now();
        self.flows
            .entry(client_key.to_string())
            .or_insert_with(|| Arc::new(SubmissionFlow::new(now)))
            .value()
            .clone()
    }

    /// Number of client flows currently remembered
    pub fn tracked_flows(&self) -> usize {
        self.flows.len()
    }

    fn flow_retention(&self) -> Duration {
        self.throttle.max(Duration::minutes(FLOW_RETENTION_MINUTES))
    }

    fn prune_flows(&self, now: DateTime<Utc>) {
        let retention = self.flow_retention();
        let before = self.flows.len();
        self.flows.retain(|_, flow| !flow.is_stale(now, retention));
        let removed = before.saturating_sub(self.flows.len());
        if removed > 0 {
            debug!(removed, "forgot settled submission flows");
        }
    }

    /// Timestamps older than the window can no longer throttle anyone
    async fn prune_throttle(&self, now: DateTime<Utc>) {
        let window = self.throttle;
        let keep = move |_: &str, raw: &str| {
            serde_json::from_str::<DateTime<Utc>>(raw).map_or(false, |at| now - at < window)
        };
        match self.client_state.retain(THROTTLE_NAMESPACE, &keep).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "pruned expired submission timestamps"),
            Err(e) => warn!(error = %e, "could not prune submission timestamps"),
        }
    }

    pub fn state(&self, client_key: &str) -> SubmissionState {
        self.flows
            .get(client_key)
            .map(|flow| flow.state())
            .unwrap_or(SubmissionState::Idle)
    }

    pub fn reset(&self, client_key: &str) -> SubmissionState {
        let now = self.clock.now();
        self.flows
            .get(client_key)
            .map(|flow| flow.reset(now))
            .unwrap_or(SubmissionState::Idle)
    }

    #[instrument(skip(self, form))]
    pub async fn submit(
        &self,
        client_key: &str,
        form: QuoteForm,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        self.prune_flows(self.clock.now());
        let in_flight = self.flow(client_key).begin(self.clock.now())?;

        let outcome = self.run(client_key, form).await;
        match &outcome {
            Ok(receipt) => {
                counter!("curtain_quotes.submissions.accepted", 1);
                info!(reference = %receipt.reference_number, "quote request stored");
            }
            Err(SubmissionError::Throttled { .. }) => {
                counter!("curtain_quotes.submissions.throttled", 1);
            }
            Err(e) => {
                counter!("curtain_quotes.submissions.rejected", 1);
                info!(error = %e, "quote request not stored");
            }
        }
        in_flight.settle(&outcome, self.clock.now());
        outcome
    }

    async fn run(
        &self,
        client_key: &str,
        form: QuoteForm,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        if !form.accepted_terms {
            return Err(SubmissionError::TermsNotAccepted);
        }

        let now = self.clock.now();
        self.check_throttle(client_key, now).await?;

        let form = form.normalized();
        form.check()?;
        let new_order = form.into_new_order()?;

        let inserted = self.store.insert(new_order.clone()).await.map_err(|e| {
            warn!(error = %e, "order store rejected submission");
            SubmissionError::Store {
                message: e.user_message().unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
                source: e,
            }
        })?;

        if let Err(e) =
            kv_store::set_json(self.client_state.as_ref(), THROTTLE_NAMESPACE, client_key, &now)
                .await
        {
            warn!(error = %e, "could not record last submission time");
        }
        self.prune_throttle(now).await;

        let order = Order {
            id: inserted.id,
            customer: new_order.customer,
            measurements: new_order.measurements,
            product_type: new_order.product_type,
            total_price: new_order.total_price,
            total_units: new_order.total_units,
            status: OrderStatus::Pending,
            reference_number: inserted.reference_number.clone(),
            budget_number: None,
            notes: new_order.notes,
            created_at: now,
            updated_at: None,
        };

        let emails = match self.email.render_confirmations(&order).await {
            Ok(emails) => Some(emails),
            Err(e) => {
                warn!(error = %e, "confirmation emails could not be rendered");
                None
            }
        };

        if self.notify_on_submission {
            let email = self.email.clone();
            let order = order.clone();
            tokio::spawn(async move { email.notify_submission(&order).await });
        }

        Ok(SubmissionReceipt {
            order_id: inserted.id,
            reference_number: inserted.reference_number,
            emails,
        })
    }

    async fn check_throttle(
        &self,
        client_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SubmissionError> {
        let last = kv_store::get_json::<DateTime<Utc>>(
            self.client_state.as_ref(),
            THROTTLE_NAMESPACE,
            client_key,
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "unreadable last submission time, ignoring");
            None
        });

        if let Some(last) = last {
            let elapsed = now - last;
            if elapsed < self.throttle {
                let remaining = self.throttle - elapsed;
                let mut secs = remaining.num_seconds();
                if remaining > Duration::seconds(secs) {
                    secs += 1;
                }
                return Err(SubmissionError::Throttled {
                    retry_after_secs: secs.max(1) as u64,
                });
            }
        }
        Ok(())
    }
}
