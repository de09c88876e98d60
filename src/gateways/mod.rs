use crate::domain::alias::AliasExtra;
use crate::domain::error::PaymentErrorKind;
use crate::domain::merchant::{Psp, PspConfig};
use crate::domain::notification::{InboundNotification, Notification, PspNotification};
use crate::domain::transaction::{PaymentData, PaymentMethod, TransactionAction};
use serde::{Deserialize, Serialize};

pub mod adyen;
pub mod braintree;
pub mod bs_payone;
pub mod error_codes;
pub mod mock;
pub mod registry;

/// Failures that are not business declines. Declines travel as `PspOutcome::Declined`.
#[derive(Debug, thiserror::Error)]
pub enum PspError {
    #[error("psp configuration error: {0}")]
    Configuration(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("psp transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for PspError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PspError::Transport("psp timeout".to_string())
        } else {
            PspError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PspOutcome {
    Approved {
        psp_transaction_id: Option<String>,
        customer_id: Option<String>,
    },
    Declined {
        psp_transaction_id: Option<String>,
        kind: PaymentErrorKind,
        message: Option<String>,
    },
}

impl PspOutcome {
    pub fn approved(psp_transaction_id: impl Into<String>) -> Self {
        PspOutcome::Approved {
            psp_transaction_id: Some(psp_transaction_id.into()),
            customer_id: None,
        }
    }

    pub fn psp_transaction_id(&self) -> Option<&str> {
        match self {
            PspOutcome::Approved { psp_transaction_id, .. }
            | PspOutcome::Declined { psp_transaction_id, .. } => psp_transaction_id.as_deref(),
        }
    }
}

/// Client-facing provider configuration. Never carries secret keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PspAliasConfig {
    #[serde(rename = "type")]
    pub psp: Option<Psp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_encryption_key: Option<String>,
}

/// Per-call inputs to config calculation supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicPspConfig {
    pub token: Option<String>,
    pub return_url: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PspRegisterAliasRequest {
    pub alias_id: String,
    pub extra: Option<AliasExtra>,
    pub psp_config: PspConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PspRegisterAliasResponse {
    pub psp_alias: Option<String>,
    pub extra: Option<AliasExtra>,
}

#[derive(Debug, Clone)]
pub struct PspPaymentRequest {
    pub alias_id: String,
    pub psp_alias: Option<String>,
    pub extra: AliasExtra,
    pub payment_data: PaymentData,
    pub purchase_id: Option<String>,
    pub customer_id: Option<String>,
    pub psp_config: PspConfig,
}

/// Follow-up operation on an earlier PSP transaction (capture, reversal or refund).
#[derive(Debug, Clone)]
pub struct PspModificationRequest {
    pub psp_transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub purchase_id: Option<String>,
    pub payment_method: PaymentMethod,
    /// Action of the transaction being modified.
    pub original_action: TransactionAction,
    pub reason: Option<String>,
    pub psp_config: PspConfig,
}

pub type PspCaptureRequest = PspModificationRequest;
pub type PspReversalRequest = PspModificationRequest;
pub type PspRefundRequest = PspModificationRequest;

#[derive(Debug, Clone)]
pub struct PspDeleteAliasRequest {
    pub alias_id: String,
    pub psp_alias: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub customer_reference: Option<String>,
    pub psp_config: PspConfig,
}

#[async_trait::async_trait]
pub trait PspGateway: Send + Sync {
    fn provider(&self) -> Psp;

    async fn calculate_config(
        &self,
        psp_config: Option<&PspConfig>,
        dynamic_config: &DynamicPspConfig,
        test_mode: bool,
    ) -> Result<Option<PspAliasConfig>, PspError>;

    async fn register_alias(
        &self,
        request: &PspRegisterAliasRequest,
        test_mode: bool,
    ) -> Result<Option<PspRegisterAliasResponse>, PspError>;

    async fn preauthorize(
        &self,
        request: &PspPaymentRequest,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError>;

    async fn authorize(
        &self,
        request: &PspPaymentRequest,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError>;

    async fn capture(
        &self,
        request: &PspCaptureRequest,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError>;

    async fn reverse(
        &self,
        request: &PspReversalRequest,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError>;

    async fn refund(
        &self,
        request: &PspRefundRequest,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError>;

    /// Best effort: provider failures are logged, never returned.
    async fn delete_alias(&self, request: &PspDeleteAliasRequest, test_mode: bool);

    fn extract_notifications(&self, _body: &[u8]) -> Result<Vec<InboundNotification>, PspError> {
        Err(PspError::UnsupportedOperation(format!(
            "{} does not push notifications",
            self.provider()
        )))
    }

    fn parse_notification(&self, _notification: &Notification) -> Result<PspNotification, PspError> {
        Err(PspError::UnsupportedOperation(format!(
            "{} does not push notifications",
            self.provider()
        )))
    }
}

pub(crate) fn require<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, PspError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PspError::Configuration(format!("{what} is missing")))
}

pub(crate) fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
