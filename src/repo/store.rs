use crate::domain::alias::Alias;
use crate::domain::merchant::{Merchant, Psp};
use crate::domain::notification::{Notification, NotificationId, NotificationStatus};
use crate::domain::transaction::{TransactionAction, TransactionRecord};
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Inserted,
    /// A row with the same unique key already exists.
    Duplicate(T),
}

/// Unit of work over transactions. Concurrent scopes opened with the same
/// lock key run one after another; dropping a scope without `commit` discards it.
#[async_trait]
pub trait TransactionScope: Send {
    async fn find_by_idempotency(
        &mut self,
        merchant_id: &str,
        idempotency_key: &str,
        action: TransactionAction,
    ) -> Result<Option<TransactionRecord>>;

    async fn list_by_transaction_id(&mut self, transaction_id: &str) -> Result<Vec<TransactionRecord>>;

    async fn insert(&mut self, record: &TransactionRecord) -> Result<InsertOutcome<TransactionRecord>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn begin(&self, lock_key: &str) -> Result<Box<dyn TransactionScope>>;

    async fn list_by_transaction_id(&self, transaction_id: &str) -> Result<Vec<TransactionRecord>>;
}

#[async_trait]
pub trait AliasStore: Send + Sync {
    async fn find_active(&self, alias_id: &str) -> Result<Option<Alias>>;

    async fn find_by_idempotency(
        &self,
        merchant_id: &str,
        idempotency_key: &str,
        psp: Psp,
        user_agent: Option<&str>,
    ) -> Result<Option<Alias>>;

    async fn insert(&self, alias: &Alias) -> Result<InsertOutcome<Alias>>;

    /// Stores the PSP alias and extra of an active alias.
    async fn update(&self, alias: &Alias) -> Result<()>;

    async fn deactivate(&self, alias_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait MerchantStore: Send + Sync {
    async fn find(&self, merchant_id: &str) -> Result<Option<Merchant>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub id: NotificationId,
    pub psp: Psp,
    pub message: serde_json::Value,
}

/// Rows held exclusively by one dispatcher. Marks become visible on `commit`;
/// dropping the claim releases every row unchanged.
#[async_trait]
pub trait NotificationClaim: Send {
    fn notifications(&self) -> &[Notification];

    /// Latest transaction row with this provider reference, read on the claim's
    /// own connection.
    async fn owning_transaction(&mut self, psp_transaction_id: &str) -> Result<Option<TransactionRecord>>;

    async fn merchant(&mut self, merchant_id: &str) -> Result<Option<Merchant>>;

    /// Sets the status and counts the delivery attempt.
    async fn mark(&mut self, id: &NotificationId, status: NotificationStatus) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Returns false when the key was already stored.
    async fn insert_if_absent(&self, notification: &NewNotification) -> Result<bool>;

    /// Claims up to `limit` CREATED or FAIL rows of `psp`, newest first, skipping
    /// rows claimed elsewhere. `max_attempts` of 0 disables the attempt cap.
    async fn claim(&self, psp: Psp, limit: i64, max_attempts: i32) -> Result<Box<dyn NotificationClaim>>;

    async fn find(&self, id: &NotificationId) -> Result<Option<Notification>>;
}
