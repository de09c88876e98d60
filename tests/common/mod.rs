#![allow(dead_code)]

use chrono::Utc;
use payment_orchestrator::domain::alias::{Alias, AliasExtra, CcConfig};
use payment_orchestrator::domain::merchant::{Merchant, Psp, PspConfig};
use payment_orchestrator::domain::transaction::{PaymentData, PaymentMethod, PaymentRequest};
use payment_orchestrator::gateways::mock::MockGateway;
use payment_orchestrator::gateways::registry::PspRegistry;
use payment_orchestrator::gateways::PspGateway;
use payment_orchestrator::repo::memory::{
    InMemoryAliasStore, InMemoryMerchantStore, InMemoryNotificationStore, InMemoryTransactionStore,
};
use payment_orchestrator::repo::store::AliasStore;
use payment_orchestrator::service::alias_service::AliasService;
use payment_orchestrator::service::notification_service::NotificationIngestor;
use payment_orchestrator::service::transaction_service::TransactionOrchestrator;
use std::sync::Arc;

pub const MERCHANT: &str = "mobilab";
pub const OTHER_MERCHANT: &str = "acme";
pub const CC_ALIAS: &str = "alias-cc";
pub const SEPA_ALIAS: &str = "alias-sepa";
pub const FOREIGN_ALIAS: &str = "alias-acme";
pub const BARE_ALIAS: &str = "alias-bare";

pub struct Harness {
    pub gateway: Arc<MockGateway>,
    pub merchants: InMemoryMerchantStore,
    pub aliases: InMemoryAliasStore,
    pub transactions: InMemoryTransactionStore,
    pub notifications: InMemoryNotificationStore,
    pub registry: PspRegistry,
    pub orchestrator: TransactionOrchestrator,
}

impl Harness {
    pub fn alias_service(&self) -> AliasService {
        AliasService::new(
            Arc::new(self.merchants.clone()),
            Arc::new(self.aliases.clone()),
            self.registry.clone(),
        )
    }

    pub fn ingestor(&self) -> NotificationIngestor {
        NotificationIngestor::new(Arc::new(self.notifications.clone()), self.registry.clone())
    }
}

pub fn merchant(id: &str, webhook_url: Option<String>) -> Merchant {
    Merchant {
        id: id.to_string(),
        psp_configs: vec![PspConfig {
            psp: Some(Psp::Mock),
            merchant_id: Some(format!("{id}-live")),
            sandbox_merchant_id: Some(format!("{id}-sandbox")),
            ..Default::default()
        }],
        webhook_url,
        webhook_username: Some("hook-user".to_string()),
        webhook_password: Some("hook-pass".to_string()),
    }
}

pub fn alias(id: &str, merchant_id: &str, method: Option<PaymentMethod>) -> Alias {
    Alias {
        id: id.to_string(),
        merchant_id: merchant_id.to_string(),
        psp: Psp::Mock,
        idempotency_key: format!("key-{id}"),
        user_agent: None,
        psp_alias: method.map(|_| format!("psp-{id}")),
        extra: method.map(|m| AliasExtra {
            cc_config: (m == PaymentMethod::Cc).then(|| CcConfig {
                cc_mask: Some("VISA-1111".to_string()),
                ..Default::default()
            }),
            ..AliasExtra::new(m)
        }),
        active: true,
        created_at: Utc::now(),
    }
}

pub async fn harness(gateway: MockGateway) -> Harness {
    harness_with_webhook(gateway, None).await
}

pub async fn harness_with_webhook(gateway: MockGateway, webhook_url: Option<String>) -> Harness {
    let gateway = Arc::new(gateway);
    let merchants = InMemoryMerchantStore::new();
    merchants.put(merchant(MERCHANT, webhook_url));
    merchants.put(merchant(OTHER_MERCHANT, None));

    let aliases = InMemoryAliasStore::new();
    for a in [
        alias(CC_ALIAS, MERCHANT, Some(PaymentMethod::Cc)),
        alias(SEPA_ALIAS, MERCHANT, Some(PaymentMethod::Sepa)),
        alias(FOREIGN_ALIAS, OTHER_MERCHANT, Some(PaymentMethod::Cc)),
        alias(BARE_ALIAS, MERCHANT, None),
    ] {
        aliases.insert(&a).await.unwrap();
    }

    let transactions = InMemoryTransactionStore::new();
    let notifications = InMemoryNotificationStore::with_stores(&transactions, &merchants);
    let registry = PspRegistry::new(vec![gateway.clone() as Arc<dyn PspGateway>]);
    let orchestrator = TransactionOrchestrator::new(
        Arc::new(merchants.clone()),
        Arc::new(aliases.clone()),
        Arc::new(transactions.clone()),
        registry.clone(),
    );

    Harness {
        gateway,
        merchants,
        aliases,
        transactions,
        notifications,
        registry,
        orchestrator,
    }
}

pub fn payment(alias_id: &str, amount: i64) -> PaymentRequest {
    PaymentRequest {
        alias_id: alias_id.to_string(),
        payment_data: PaymentData {
            amount,
            currency: "EUR".to_string(),
            reason: Some("order 42".to_string()),
        },
        purchase_id: Some("purchase-1".to_string()),
        customer_id: Some("customer-1".to_string()),
    }
}
