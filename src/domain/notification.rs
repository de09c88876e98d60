use crate::domain::merchant::Psp;
use crate::domain::transaction::{PaymentMethod, TransactionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Created,
    Success,
    Fail,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Created => "CREATED",
            NotificationStatus::Success => "SUCCESS",
            NotificationStatus::Fail => "FAIL",
        }
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, NotificationStatus::Created | NotificationStatus::Fail)
    }
}

impl FromStr for NotificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(NotificationStatus::Created),
            "SUCCESS" => Ok(NotificationStatus::Success),
            "FAIL" => Ok(NotificationStatus::Fail),
            other => Err(anyhow::anyhow!("unknown notification status {other}")),
        }
    }
}

/// Dedup key of an inbound PSP event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId {
    pub psp_transaction_id: String,
    pub psp_event: String,
}

impl NotificationId {
    pub fn new(psp_transaction_id: impl Into<String>, psp_event: impl Into<String>) -> Self {
        Self {
            psp_transaction_id: psp_transaction_id.into(),
            psp_event: psp_event.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub status: NotificationStatus,
    pub psp: Psp,
    pub message: serde_json::Value,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundNotification {
    pub id: NotificationId,
    pub message: serde_json::Value,
}

/// Lifecycle event a notification reports. Wider than `TransactionAction`
/// because PSPs also push chargebacks and informational events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationAction {
    Preauth,
    Auth,
    Capture,
    Reversal,
    Refund,
    Chargeback,
    ChargebackReversed,
    Additional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PspNotification {
    pub psp_transaction_id: String,
    pub action: NotificationAction,
    pub status: TransactionStatus,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantNotification {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub action: NotificationAction,
    pub payment_method: PaymentMethod,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub reason: Option<String>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantNotificationBatch {
    pub notifications: Vec<MerchantNotification>,
}
