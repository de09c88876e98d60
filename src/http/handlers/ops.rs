use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// Ready once the database answers and at least one provider is registered.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let db = match &state.pool {
        Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
        None => true,
    };
    let mut providers: Vec<&'static str> = state
        .transactions
        .registry
        .providers()
        .into_iter()
        .map(|p| p.as_str())
        .collect();
    providers.sort_unstable();

    let ready = db && !providers.is_empty();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(serde_json::json!({ "ready": ready, "db": db, "providers": providers })),
    )
}

pub async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "alive": true }))
}
