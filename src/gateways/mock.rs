use crate::domain::merchant::{Psp, PspConfig};
use crate::domain::notification::{
    InboundNotification, Notification, NotificationAction, NotificationId, PspNotification,
};
use crate::domain::transaction::TransactionStatus;
use crate::gateways::error_codes::map_provider_code;
use crate::gateways::{
    DynamicPspConfig, PspAliasConfig, PspCaptureRequest, PspDeleteAliasRequest, PspError,
    PspGateway, PspOutcome, PspPaymentRequest, PspRefundRequest, PspRegisterAliasRequest,
    PspRegisterAliasResponse, PspReversalRequest,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Approves with the given PSP id, or a generated one.
    Approve(Option<String>),
    Decline { code: String, message: String },
    Timeout,
}

/// Sandbox provider. Counts every payment-affecting call.
pub struct MockGateway {
    pub behavior: MockBehavior,
    pub delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockGateway {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn approving() -> Self {
        Self::new(MockBehavior::Approve(None))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Parses the `MOCK_PSP_BEHAVIOR` setting used by sandbox deployments.
    pub fn from_setting(setting: &str) -> Self {
        match setting.trim().to_uppercase().as_str() {
            "ALWAYS_FAILURE" => Self::new(MockBehavior::Decline {
                code: "MOCK_DECLINED".to_string(),
                message: "mock decline".to_string(),
            }),
            "ALWAYS_TIMEOUT" => Self::new(MockBehavior::Timeout),
            _ => Self::approving(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<PspOutcome, PspError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            MockBehavior::Approve(id) => Ok(PspOutcome::Approved {
                psp_transaction_id: Some(
                    id.clone()
                        .unwrap_or_else(|| format!("mock_txn_{}", uuid::Uuid::new_v4().simple())),
                ),
                customer_id: None,
            }),
            MockBehavior::Decline { code, message } => Ok(PspOutcome::Declined {
                psp_transaction_id: None,
                kind: map_provider_code(Psp::Mock, code),
                message: Some(message.clone()),
            }),
            MockBehavior::Timeout => Err(PspError::Transport("mock timeout".to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockNotificationBody {
    notifications: Vec<MockNotificationItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockNotificationItem {
    psp_transaction_id: String,
    event: String,
    success: bool,
    amount: Option<i64>,
    currency: Option<String>,
    reason: Option<String>,
}

fn mock_action(event: &str) -> NotificationAction {
    match event {
        "AUTH" => NotificationAction::Auth,
        "PREAUTH" => NotificationAction::Preauth,
        "CAPTURE" => NotificationAction::Capture,
        "REVERSAL" => NotificationAction::Reversal,
        "REFUND" => NotificationAction::Refund,
        "CHARGEBACK" => NotificationAction::Chargeback,
        _ => NotificationAction::Additional,
    }
}

#[async_trait::async_trait]
impl PspGateway for MockGateway {
    fn provider(&self) -> Psp {
        Psp::Mock
    }

    async fn calculate_config(
        &self,
        psp_config: Option<&PspConfig>,
        _dynamic_config: &DynamicPspConfig,
        test_mode: bool,
    ) -> Result<Option<PspAliasConfig>, PspError> {
        Ok(psp_config.map(|cfg| PspAliasConfig {
            psp: Some(Psp::Mock),
            merchant_id: cfg.merchant_account(test_mode).map(str::to_string),
            mode: Some(if test_mode { "test" } else { "live" }.to_string()),
            ..Default::default()
        }))
    }

    async fn register_alias(
        &self,
        request: &PspRegisterAliasRequest,
        _test_mode: bool,
    ) -> Result<Option<PspRegisterAliasResponse>, PspError> {
        Ok(Some(PspRegisterAliasResponse {
            psp_alias: Some(format!("mock_alias_{}", request.alias_id)),
            extra: request.extra.clone(),
        }))
    }

    async fn preauthorize(&self, _request: &PspPaymentRequest, _test_mode: bool) -> Result<PspOutcome, PspError> {
        self.respond().await
    }

    async fn authorize(&self, _request: &PspPaymentRequest, _test_mode: bool) -> Result<PspOutcome, PspError> {
        self.respond().await
    }

    async fn capture(&self, _request: &PspCaptureRequest, _test_mode: bool) -> Result<PspOutcome, PspError> {
        self.respond().await
    }

    async fn reverse(&self, _request: &PspReversalRequest, _test_mode: bool) -> Result<PspOutcome, PspError> {
        self.respond().await
    }

    async fn refund(&self, _request: &PspRefundRequest, _test_mode: bool) -> Result<PspOutcome, PspError> {
        self.respond().await
    }

    async fn delete_alias(&self, request: &PspDeleteAliasRequest, _test_mode: bool) {
        tracing::info!(alias_id = %request.alias_id, "mock alias deleted");
    }

    fn extract_notifications(&self, body: &[u8]) -> Result<Vec<InboundNotification>, PspError> {
        let parsed: MockNotificationBody = serde_json::from_slice(body)
            .map_err(|e| PspError::Configuration(format!("invalid notification body: {e}")))?;
        parsed
            .notifications
            .into_iter()
            .map(|item| {
                let id = NotificationId::new(item.psp_transaction_id.clone(), item.event.clone());
                let message = serde_json::json!({
                    "pspTransactionId": item.psp_transaction_id,
                    "event": item.event,
                    "success": item.success,
                    "amount": item.amount,
                    "currency": item.currency,
                    "reason": item.reason,
                });
                Ok(InboundNotification { id, message })
            })
            .collect()
    }

    fn parse_notification(&self, notification: &Notification) -> Result<PspNotification, PspError> {
        let item: MockNotificationItem = serde_json::from_value(notification.message.clone())
            .map_err(|e| PspError::Configuration(format!("invalid stored notification: {e}")))?;
        Ok(PspNotification {
            psp_transaction_id: notification.id.psp_transaction_id.clone(),
            action: mock_action(&notification.id.psp_event),
            status: if item.success {
                TransactionStatus::Success
            } else {
                TransactionStatus::Fail
            },
            amount: item.amount,
            currency: item.currency,
            reason: item.reason,
        })
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::approving()
    }
}
