use crate::domain::transaction::{CaptureRequest, PaymentRequest, RefundRequest, ReversalRequest};
use crate::http::request_context::{error_response, executed_response, RequestContext};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;

pub async fn preauthorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PaymentRequest>,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    match state
        .transactions
        .preauthorize(&ctx.merchant_id, ctx.idempotency_key.as_deref(), ctx.test_mode, &req)
        .await
    {
        Ok(executed) => executed_response(executed),
        Err(e) => error_response(e),
    }
}

pub async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PaymentRequest>,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    match state
        .transactions
        .authorize(&ctx.merchant_id, ctx.idempotency_key.as_deref(), ctx.test_mode, &req)
        .await
    {
        Ok(executed) => executed_response(executed),
        Err(e) => error_response(e),
    }
}

pub async fn capture(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
    req: Option<Json<CaptureRequest>>,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    let req = req.map(|Json(r)| r).unwrap_or_default();
    match state
        .transactions
        .capture(
            &ctx.merchant_id,
            &transaction_id,
            ctx.idempotency_key.as_deref(),
            ctx.test_mode,
            &req,
        )
        .await
    {
        Ok(executed) => executed_response(executed),
        Err(e) => error_response(e),
    }
}

pub async fn reverse(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
    req: Option<Json<ReversalRequest>>,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    let req = req.map(|Json(r)| r).unwrap_or_default();
    match state
        .transactions
        .reverse(
            &ctx.merchant_id,
            &transaction_id,
            ctx.idempotency_key.as_deref(),
            ctx.test_mode,
            &req,
        )
        .await
    {
        Ok(executed) => executed_response(executed),
        Err(e) => error_response(e),
    }
}

pub async fn refund(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    match state
        .transactions
        .refund(
            &ctx.merchant_id,
            &transaction_id,
            ctx.idempotency_key.as_deref(),
            ctx.test_mode,
            &req,
        )
        .await
    {
        Ok(executed) => executed_response(executed),
        Err(e) => error_response(e),
    }
}
