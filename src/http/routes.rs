use crate::http::handlers::{aliases, notifications, ops, payments};
use crate::AppState;
use axum::routing::{get, post, put};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/preauthorization", put(payments::preauthorize))
        .route("/authorization", put(payments::authorize))
        .route("/preauthorization/:transaction_id/capture", put(payments::capture))
        .route("/preauthorization/:transaction_id/reverse", put(payments::reverse))
        .route("/authorization/:transaction_id/refund", put(payments::refund))
        .route("/alias", post(aliases::create_alias))
        .route(
            "/alias/:alias_id",
            put(aliases::exchange_alias).delete(aliases::delete_alias),
        )
        .route("/notification/adyen", post(notifications::adyen))
        .route("/notification/bs-payone", post(notifications::bs_payone))
        .route("/notification/mock", post(notifications::mock))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .with_state(state)
}
