pub mod config;
pub mod domain {
    pub mod alias;
    pub mod error;
    pub mod merchant;
    pub mod notification;
    pub mod transaction;
}
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod aliases;
        pub mod notifications;
        pub mod ops;
        pub mod payments;
    }
    pub mod request_context;
    pub mod routes;
}
pub mod repo {
    pub mod aliases_repo;
    pub mod memory;
    pub mod merchants_repo;
    pub mod notifications_repo;
    pub mod store;
    pub mod transactions_repo;
}
pub mod service {
    pub mod alias_service;
    pub mod notification_dispatcher;
    pub mod notification_service;
    pub mod transaction_service;
}

use crate::config::AppConfig;
use crate::gateways::adyen::AdyenGateway;
use crate::gateways::braintree::BraintreeGateway;
use crate::gateways::bs_payone::BsPayoneGateway;
use crate::gateways::mock::MockGateway;
use crate::gateways::registry::PspRegistry;
use crate::gateways::PspGateway;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub transactions: service::transaction_service::TransactionOrchestrator,
    pub aliases: service::alias_service::AliasService,
    pub notifications: service::notification_service::NotificationIngestor,
    /// Absent when running on the in-memory stores.
    pub pool: Option<sqlx::PgPool>,
}

/// Registers every provider adapter with the configured endpoints and timeout.
pub fn build_registry(cfg: &AppConfig) -> PspRegistry {
    let client = reqwest::Client::new();
    let endpoints = &cfg.endpoints;
    let gateways: Vec<Arc<dyn PspGateway>> = vec![
        Arc::new(BsPayoneGateway {
            base_url: endpoints.bs_payone_base_url.clone(),
            api_version: endpoints.bs_payone_api_version.clone(),
            encoding: endpoints.bs_payone_encoding.clone(),
            timeout_ms: cfg.psp_timeout_ms,
            client: client.clone(),
        }),
        Arc::new(AdyenGateway {
            base_url: endpoints.adyen_base_url.clone(),
            test_base_url: endpoints.adyen_test_base_url.clone(),
            timeout_ms: cfg.psp_timeout_ms,
            client: client.clone(),
        }),
        Arc::new(BraintreeGateway {
            base_url: endpoints.braintree_base_url.clone(),
            sandbox_base_url: endpoints.braintree_sandbox_base_url.clone(),
            timeout_ms: cfg.psp_timeout_ms,
            client,
        }),
        Arc::new(MockGateway::from_setting(&cfg.mock_behavior)),
    ];
    PspRegistry::new(gateways)
}
