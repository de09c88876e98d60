use crate::domain::error::{ApiError, ApiErrorCode};
use crate::domain::transaction::Executed;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub const MERCHANT_ID: &str = "Merchant-Id";
pub const IDEMPOTENT_KEY: &str = "Idempotent-Key";
pub const PSP_TEST_MODE: &str = "PSP-Test-Mode";
pub const PSP_TYPE: &str = "PSP-Type";

/// Caller identity and per-request flags. Authentication happens upstream;
/// the merchant arrives already resolved in `Merchant-Id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub merchant_id: String,
    pub idempotency_key: Option<String>,
    pub test_mode: bool,
    pub user_agent: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let merchant_id = header(headers, MERCHANT_ID).ok_or_else(|| {
            ApiError::with_message(ApiErrorCode::AuthenticationError, "Merchant-Id header is required")
        })?;
        Ok(Self {
            merchant_id,
            idempotency_key: header(headers, IDEMPOTENT_KEY),
            test_mode: header(headers, PSP_TEST_MODE)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            user_agent: header(headers, axum::http::header::USER_AGENT.as_str()),
        })
    }

    pub fn psp_type(headers: &HeaderMap) -> Option<String> {
        header(headers, PSP_TYPE)
    }
}

pub fn error_response(e: ApiError) -> Response {
    let (status, body) = e.into_parts();
    (status, Json(body)).into_response()
}

/// 201 for a first execution, 200 for a replay.
pub fn executed_response<T: Serialize>(executed: Executed<T>) -> Response {
    let status = if executed.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(executed.value)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_payment_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(MERCHANT_ID, HeaderValue::from_static("mobilab"));
        headers.insert(IDEMPOTENT_KEY, HeaderValue::from_static("k1"));
        headers.insert(PSP_TEST_MODE, HeaderValue::from_static("TRUE"));
        let ctx = RequestContext::from_headers(&headers).unwrap();
        assert_eq!(ctx.merchant_id, "mobilab");
        assert_eq!(ctx.idempotency_key.as_deref(), Some("k1"));
        assert!(ctx.test_mode);
        assert_eq!(ctx.user_agent, None);
    }

    #[test]
    fn missing_merchant_is_an_authentication_error() {
        let err = RequestContext::from_headers(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.code, ApiErrorCode::AuthenticationError);
    }
}
