use crate::domain::error::PaymentErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionAction {
    Preauth,
    Auth,
    Capture,
    Reversal,
    Refund,
}

impl TransactionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionAction::Preauth => "PREAUTH",
            TransactionAction::Auth => "AUTH",
            TransactionAction::Capture => "CAPTURE",
            TransactionAction::Reversal => "REVERSAL",
            TransactionAction::Refund => "REFUND",
        }
    }
}

impl FromStr for TransactionAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PREAUTH" => Ok(TransactionAction::Preauth),
            "AUTH" => Ok(TransactionAction::Auth),
            "CAPTURE" => Ok(TransactionAction::Capture),
            "REVERSAL" => Ok(TransactionAction::Reversal),
            "REFUND" => Ok(TransactionAction::Refund),
            other => Err(anyhow::anyhow!("unknown transaction action {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Fail,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Fail => "FAIL",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAIL" => Ok(TransactionStatus::Fail),
            other => Err(anyhow::anyhow!("unknown transaction status {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cc,
    Sepa,
    PayPal,
    GooglePay,
    ApplePay,
    Klarna,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cc => "CC",
            PaymentMethod::Sepa => "SEPA",
            PaymentMethod::PayPal => "PAY_PAL",
            PaymentMethod::GooglePay => "GOOGLE_PAY",
            PaymentMethod::ApplePay => "APPLE_PAY",
            PaymentMethod::Klarna => "KLARNA",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CC" => Ok(PaymentMethod::Cc),
            "SEPA" => Ok(PaymentMethod::Sepa),
            "PAY_PAL" => Ok(PaymentMethod::PayPal),
            "GOOGLE_PAY" => Ok(PaymentMethod::GooglePay),
            "APPLE_PAY" => Ok(PaymentMethod::ApplePay),
            "KLARNA" => Ok(PaymentMethod::Klarna),
            other => Err(anyhow::anyhow!("unknown payment method {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentData {
    pub amount: i64,
    pub currency: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub alias_id: String,
    pub payment_data: PaymentData,
    pub purchase_id: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    /// Defaults to the full preauthorized amount.
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub amount: i64,
    pub currency: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub idempotency_key: String,
    pub action: TransactionAction,
    pub status: TransactionStatus,
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub psp_transaction_id: Option<String>,
    pub psp_customer_id: Option<String>,
    pub merchant_id: String,
    pub alias_id: String,
    pub merchant_transaction_id: Option<String>,
    pub merchant_customer_id: Option<String>,
    pub reason: Option<String>,
    pub psp_test_mode: bool,
    pub request_hash: String,
    pub error_kind: Option<PaymentErrorKind>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub action: TransactionAction,
    pub psp_transaction_id: Option<String>,
    pub error: Option<PaymentErrorKind>,
    pub error_message: Option<String>,
}

impl From<&TransactionRecord> for PaymentResponse {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            transaction_id: record.transaction_id.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            status: record.status,
            action: record.action,
            psp_transaction_id: record.psp_transaction_id.clone(),
            error: record.error_kind,
            error_message: record.error_message.clone(),
        }
    }
}

/// Result of an idempotent operation: `created` is false when a stored result was replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed<T> {
    pub value: T,
    pub created: bool,
}
