use crate::domain::alias::AliasRequest;
use crate::domain::error::{ApiError, ApiErrorCode};
use crate::domain::merchant::Psp;
use crate::gateways::DynamicPspConfig;
use crate::http::request_context::{error_response, executed_response, RequestContext};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

pub async fn create_alias(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<DynamicPspConfig>>,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    let psp = match RequestContext::psp_type(&headers).map(|p| p.parse::<Psp>()) {
        Some(Ok(psp)) => psp,
        Some(Err(_)) => return error_response(ApiError::of(ApiErrorCode::PspImplNotFound)),
        None => {
            return error_response(ApiError::with_message(
                ApiErrorCode::ValidationError,
                "PSP-Type header is required",
            ))
        }
    };
    let dynamic_config = body.map(|Json(c)| c).unwrap_or_default();
    match state
        .aliases
        .create_alias(
            &ctx.merchant_id,
            psp,
            ctx.idempotency_key.as_deref(),
            ctx.user_agent.as_deref(),
            ctx.test_mode,
            &dynamic_config,
        )
        .await
    {
        Ok(executed) => executed_response(executed),
        Err(e) => error_response(e),
    }
}

pub async fn exchange_alias(
    State(state): State<AppState>,
    Path(alias_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AliasRequest>,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    match state
        .aliases
        .exchange_alias(&ctx.merchant_id, &alias_id, ctx.test_mode, &req)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_alias(
    State(state): State<AppState>,
    Path(alias_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match RequestContext::from_headers(&headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    match state
        .aliases
        .delete_alias(&ctx.merchant_id, &alias_id, ctx.test_mode)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
