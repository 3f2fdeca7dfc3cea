use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};

use crate::services::submission::{
    QuoteForm, SubmissionError, SubmissionReceipt, SubmissionState,
};
use crate::{ApiResponse, ApiResult, AppState};

/// Header identifying the browser session submitting quotes
pub const CLIENT_ID_HEADER: &str = "x-client-id";
const ANONYMOUS_CLIENT: &str = "anonymous";
const MAX_CLIENT_ID_LEN: usize = 128;

/// Throttle key for the request; missing or oversized ids share one bucket
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_CLIENT_ID_LEN)
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}

fn rejection(err: SubmissionError) -> Response {
    let status = err.status_code();
    let retry_after = match &err {
        SubmissionError::Throttled { retry_after_secs } => Some(*retry_after_secs),
        _ => None,
    };
    let body = match err {
        SubmissionError::Invalid { message, errors } => ApiResponse::<()> {
            message: Some(message),
            ..ApiResponse::validation_errors(errors)
        },
        other => ApiResponse::<()>::error(other.to_string()),
    };

    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

#[utoipa::path(
    post,
    path = "/api/v1/quotes",
    summary = "Submit a quote request",
    description = "Stores the wizard's quote request and returns its reference number with the rendered confirmation emails",
    request_body = QuoteForm,
    params(("X-Client-Id" = Option<String>, Header, description = "Client session id used for throttling")),
    responses(
        (status = 201, description = "Quote request stored", body = ApiResponse<SubmissionReceipt>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Terms not accepted or invalid fields", body = ApiResponse<serde_json::Value>),
        (status = 409, description = "A submission is already in progress", body = ApiResponse<serde_json::Value>),
        (status = 429, description = "Submitted too recently", body = ApiResponse<serde_json::Value>,
            headers(("Retry-After" = String, description = "Seconds until the next submission is allowed"))
        ),
        (status = 500, description = "Order could not be stored", body = ApiResponse<serde_json::Value>),
    ),
    tag = "quotes"
)]
pub async fn submit_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<QuoteForm>,
) -> Response {
    let key = client_key(&headers);
    match state.services.submissions.submit(&key, form).await {
        Ok(receipt) => (StatusCode::CREATED, Json(ApiResponse::success(receipt))).into_response(),
        Err(err) => rejection(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/quotes/state",
    summary = "Submission state",
    description = "Current submission state for the calling client",
    params(("X-Client-Id" = Option<String>, Header, description = "Client session id")),
    responses(
        (status = 200, description = "Current state", body = ApiResponse<SubmissionState>),
    ),
    tag = "quotes"
)]
pub async fn submission_state(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SubmissionState> {
    let key = client_key(&headers);
    Ok(Json(ApiResponse::success(
        state.services.submissions.state(&key),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/quotes/state",
    summary = "Reset submission state",
    description = "Returns the calling client's flow to idle so the form can be filled again",
    params(("X-Client-Id" = Option<String>, Header, description = "Client session id")),
    responses(
        (status = 200, description = "State after the reset", body = ApiResponse<SubmissionState>),
    ),
    tag = "quotes"
)]
pub async fn reset_submission(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SubmissionState> {
    let key = client_key(&headers);
    Ok(Json(ApiResponse::success(
        state.services.submissions.reset(&key),
    )))
}
