use crate::domain::merchant::Psp;
use crate::http::request_context::error_response;
use crate::service::notification_service::acknowledgement;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

async fn ingest(state: &AppState, psp: Psp, body: &[u8]) -> Response {
    match state.notifications.ingest(psp, body).await {
        Ok(_) => {
            let (content_type, ack) = acknowledgement(psp);
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], ack).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn adyen(State(state): State<AppState>, body: Bytes) -> Response {
    ingest(&state, Psp::Adyen, &body).await
}

pub async fn bs_payone(State(state): State<AppState>, body: Bytes) -> Response {
    ingest(&state, Psp::BsPayone, &body).await
}

pub async fn mock(State(state): State<AppState>, body: Bytes) -> Response {
    ingest(&state, Psp::Mock, &body).await
}
