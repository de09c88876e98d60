use crate::domain::alias::Alias;
use crate::domain::merchant::{Merchant, Psp};
use crate::domain::notification::{Notification, NotificationId, NotificationStatus};
use crate::domain::transaction::{TransactionAction, TransactionRecord};
use crate::repo::store::{
    AliasStore, InsertOutcome, MerchantStore, NewNotification, NotificationClaim, NotificationStore,
    TransactionScope, TransactionStore,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-local transaction store for tests and single-node sandbox runs.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    rows: Arc<Mutex<Vec<TransactionRecord>>>,
    scopes: ScopeLocks,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TransactionRecord> {
        lock(&self.rows).clone()
    }

    fn latest_by_psp_transaction_id(&self, psp_transaction_id: &str) -> Option<TransactionRecord> {
        lock(&self.rows)
            .iter()
            .rev()
            .find(|r| r.psp_transaction_id.as_deref() == Some(psp_transaction_id))
            .cloned()
    }

    #[cfg(test)]
    fn open_scopes(&self) -> usize {
        lock(&self.scopes).len()
    }
}

fn same_key(row: &TransactionRecord, merchant_id: &str, key: &str, action: TransactionAction) -> bool {
    row.merchant_id == merchant_id && row.idempotency_key == key && row.action == action
}

type ScopeLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

pub struct InMemoryTransactionScope {
    rows: Arc<Mutex<Vec<TransactionRecord>>>,
    pending: Vec<TransactionRecord>,
    key: String,
    scopes: ScopeLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InMemoryTransactionScope {
    fn drop(&mut self) {
        let mut scopes = lock(&self.scopes);
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map refers to it.
        if scopes.get(&self.key).is_some_and(|m| Arc::strong_count(m) == 1) {
            scopes.remove(&self.key);
        }
    }
}

impl InMemoryTransactionScope {
    fn visible(&self) -> Vec<TransactionRecord> {
        let mut rows = lock(&self.rows).clone();
        rows.extend(self.pending.iter().cloned());
        rows
    }
}

#[async_trait]
impl TransactionScope for InMemoryTransactionScope {
    async fn find_by_idempotency(
        &mut self,
        merchant_id: &str,
        idempotency_key: &str,
        action: TransactionAction,
    ) -> Result<Option<TransactionRecord>> {
        Ok(self
            .visible()
            .into_iter()
            .find(|r| same_key(r, merchant_id, idempotency_key, action)))
    }

    async fn list_by_transaction_id(&mut self, transaction_id: &str) -> Result<Vec<TransactionRecord>> {
        Ok(self
            .visible()
            .into_iter()
            .filter(|r| r.transaction_id == transaction_id)
            .collect())
    }

    async fn insert(&mut self, record: &TransactionRecord) -> Result<InsertOutcome<TransactionRecord>> {
        if let Some(existing) = self
            .visible()
            .into_iter()
            .find(|r| same_key(r, &record.merchant_id, &record.idempotency_key, record.action))
        {
            return Ok(InsertOutcome::Duplicate(existing));
        }
        self.pending.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut rows = lock(&self.rows);
        for record in &self.pending {
            if rows
                .iter()
                .any(|r| same_key(r, &record.merchant_id, &record.idempotency_key, record.action))
            {
                anyhow::bail!(
                    "duplicate key (merchant_id, idempotency_key, action) for {}",
                    record.transaction_id
                );
            }
        }
        rows.extend(self.pending.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn begin(&self, lock_key: &str) -> Result<Box<dyn TransactionScope>> {
        let scope_lock = lock(&self.scopes)
            .entry(lock_key.to_string())
            .or_default()
            .clone();
        let guard = scope_lock.lock_owned().await;
        Ok(Box::new(InMemoryTransactionScope {
            rows: self.rows.clone(),
            pending: Vec::new(),
            key: lock_key.to_string(),
            scopes: self.scopes.clone(),
            guard: Some(guard),
        }))
    }

    async fn list_by_transaction_id(&self, transaction_id: &str) -> Result<Vec<TransactionRecord>> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|r| r.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAliasStore {
    aliases: Arc<Mutex<HashMap<String, Alias>>>,
}

impl InMemoryAliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, alias_id: &str) -> Option<Alias> {
        lock(&self.aliases).get(alias_id).cloned()
    }
}

fn alias_key_matches(a: &Alias, merchant_id: &str, key: &str, psp: Psp, user_agent: Option<&str>) -> bool {
    a.merchant_id == merchant_id
        && a.idempotency_key == key
        && a.psp == psp
        && a.user_agent.as_deref().unwrap_or_default() == user_agent.unwrap_or_default()
}

#[async_trait]
impl AliasStore for InMemoryAliasStore {
    async fn find_active(&self, alias_id: &str) -> Result<Option<Alias>> {
        Ok(lock(&self.aliases).get(alias_id).filter(|a| a.active).cloned())
    }

    async fn find_by_idempotency(
        &self,
        merchant_id: &str,
        idempotency_key: &str,
        psp: Psp,
        user_agent: Option<&str>,
    ) -> Result<Option<Alias>> {
        Ok(lock(&self.aliases)
            .values()
            .find(|a| alias_key_matches(a, merchant_id, idempotency_key, psp, user_agent))
            .cloned())
    }

    async fn insert(&self, alias: &Alias) -> Result<InsertOutcome<Alias>> {
        let mut aliases = lock(&self.aliases);
        if let Some(existing) = aliases.values().find(|a| {
            alias_key_matches(
                a,
                &alias.merchant_id,
                &alias.idempotency_key,
                alias.psp,
                alias.user_agent.as_deref(),
            )
        }) {
            return Ok(InsertOutcome::Duplicate(existing.clone()));
        }
        aliases.insert(alias.id.clone(), alias.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn update(&self, alias: &Alias) -> Result<()> {
        if let Some(stored) = lock(&self.aliases).get_mut(&alias.id).filter(|a| a.active) {
            stored.psp_alias = alias.psp_alias.clone();
            stored.extra = alias.extra.clone();
        }
        Ok(())
    }

    async fn deactivate(&self, alias_id: &str) -> Result<bool> {
        Ok(match lock(&self.aliases).get_mut(alias_id) {
            Some(alias) if alias.active => {
                alias.active = false;
                true
            }
            _ => false,
        })
    }
}

#[derive(Default, Clone)]
pub struct InMemoryMerchantStore {
    merchants: Arc<Mutex<HashMap<String, Merchant>>>,
}

impl InMemoryMerchantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, merchant: Merchant) {
        lock(&self.merchants).insert(merchant.id.clone(), merchant);
    }
}

#[async_trait]
impl MerchantStore for InMemoryMerchantStore {
    async fn find(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        Ok(lock(&self.merchants).get(merchant_id).cloned())
    }
}

#[derive(Default)]
struct NotificationTable {
    rows: HashMap<NotificationId, Notification>,
    claimed: HashSet<NotificationId>,
}

/// Claims resolve transactions and merchants against the stores given here.
#[derive(Default, Clone)]
pub struct InMemoryNotificationStore {
    table: Arc<Mutex<NotificationTable>>,
    transactions: InMemoryTransactionStore,
    merchants: InMemoryMerchantStore,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stores(transactions: &InMemoryTransactionStore, merchants: &InMemoryMerchantStore) -> Self {
        Self {
            table: Arc::default(),
            transactions: transactions.clone(),
            merchants: merchants.clone(),
        }
    }

    pub fn all(&self) -> Vec<Notification> {
        lock(&self.table).rows.values().cloned().collect()
    }
}

pub struct InMemoryNotificationClaim {
    table: Arc<Mutex<NotificationTable>>,
    transactions: InMemoryTransactionStore,
    merchants: InMemoryMerchantStore,
    rows: Vec<Notification>,
    marks: HashMap<NotificationId, NotificationStatus>,
    committed: bool,
}

#[async_trait]
impl NotificationClaim for InMemoryNotificationClaim {
    fn notifications(&self) -> &[Notification] {
        &self.rows
    }

    async fn owning_transaction(&mut self, psp_transaction_id: &str) -> Result<Option<TransactionRecord>> {
        Ok(self.transactions.latest_by_psp_transaction_id(psp_transaction_id))
    }

    async fn merchant(&mut self, merchant_id: &str) -> Result<Option<Merchant>> {
        Ok(lock(&self.merchants.merchants).get(merchant_id).cloned())
    }

    async fn mark(&mut self, id: &NotificationId, status: NotificationStatus) -> Result<()> {
        if !self.rows.iter().any(|n| &n.id == id) {
            anyhow::bail!("notification {id:?} is not part of this claim");
        }
        self.marks.insert(id.clone(), status);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let mut table = lock(&self.table);
        let now = Utc::now();
        for (id, status) in &self.marks {
            if let Some(row) = table.rows.get_mut(id) {
                row.status = *status;
                row.attempts += 1;
                row.updated_at = now;
            }
        }
        for row in &self.rows {
            table.claimed.remove(&row.id);
        }
        drop(table);
        self.committed = true;
        Ok(())
    }
}

impl Drop for InMemoryNotificationClaim {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut table = lock(&self.table);
        for row in &self.rows {
            table.claimed.remove(&row.id);
        }
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert_if_absent(&self, notification: &NewNotification) -> Result<bool> {
        let mut table = lock(&self.table);
        if table.rows.contains_key(&notification.id) {
            return Ok(false);
        }
        let now = Utc::now();
        table.rows.insert(
            notification.id.clone(),
            Notification {
                id: notification.id.clone(),
                status: NotificationStatus::Created,
                psp: notification.psp,
                message: notification.message.clone(),
                attempts: 0,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn claim(&self, psp: Psp, limit: i64, max_attempts: i32) -> Result<Box<dyn NotificationClaim>> {
        let mut table = lock(&self.table);
        let mut candidates: Vec<Notification> = table
            .rows
            .values()
            .filter(|n| n.psp == psp && n.status.is_claimable())
            .filter(|n| max_attempts == 0 || n.attempts < max_attempts)
            .filter(|n| !table.claimed.contains(&n.id))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        candidates.truncate(usize::try_from(limit.max(0)).unwrap_or_default());
        for n in &candidates {
            table.claimed.insert(n.id.clone());
        }
        drop(table);
        Ok(Box::new(InMemoryNotificationClaim {
            table: self.table.clone(),
            transactions: self.transactions.clone(),
            merchants: self.merchants.clone(),
            rows: candidates,
            marks: HashMap::new(),
            committed: false,
        }))
    }

    async fn find(&self, id: &NotificationId) -> Result<Option<Notification>> {
        Ok(lock(&self.table).rows.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_notification(txid: &str, event: &str) -> NewNotification {
        NewNotification {
            id: NotificationId::new(txid, event),
            psp: Psp::Adyen,
            message: json!({"pspReference": txid}),
        }
    }

    #[tokio::test]
    async fn second_insert_of_same_key_is_ignored() {
        let store = InMemoryNotificationStore::new();
        assert!(store.insert_if_absent(&new_notification("t1", "CAPTURE")).await.unwrap());
        assert!(!store.insert_if_absent(&new_notification("t1", "CAPTURE")).await.unwrap());
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn dropped_claim_releases_rows_unchanged() {
        let store = InMemoryNotificationStore::new();
        store.insert_if_absent(&new_notification("t1", "AUTHORISATION")).await.unwrap();

        let mut claim = store.claim(Psp::Adyen, 10, 0).await.unwrap();
        assert_eq!(claim.notifications().len(), 1);
        let id = claim.notifications()[0].id.clone();
        claim.mark(&id, NotificationStatus::Success).await.unwrap();
        assert!(store.claim(Psp::Adyen, 10, 0).await.unwrap().notifications().is_empty());
        drop(claim);

        let again = store.claim(Psp::Adyen, 10, 0).await.unwrap();
        assert_eq!(again.notifications().len(), 1);
        assert_eq!(again.notifications()[0].status, NotificationStatus::Created);
        assert_eq!(again.notifications()[0].attempts, 0);
    }

    #[tokio::test]
    async fn finished_scopes_release_their_lock_entry() {
        let store = InMemoryTransactionStore::new();
        let first = store.begin("tx-1").await.unwrap();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.begin("tx-1").await.unwrap().commit().await })
        };
        tokio::task::yield_now().await;
        let other = store.begin("tx-2").await.unwrap();
        assert_eq!(store.open_scopes(), 2);

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(store.open_scopes(), 1);
        other.commit().await.unwrap();
        assert_eq!(store.open_scopes(), 0);
    }

    #[tokio::test]
    async fn claim_reads_owner_and_merchant_from_its_stores() {
        let transactions = InMemoryTransactionStore::new();
        let merchants = InMemoryMerchantStore::new();
        merchants.put(Merchant {
            id: "m1".into(),
            psp_configs: Vec::new(),
            webhook_url: None,
            webhook_username: None,
            webhook_password: None,
        });
        let store = InMemoryNotificationStore::with_stores(&transactions, &merchants);
        store.insert_if_absent(&new_notification("t1", "CAPTURE")).await.unwrap();

        let mut claim = store.claim(Psp::Adyen, 10, 0).await.unwrap();
        assert!(claim.owning_transaction("t1").await.unwrap().is_none());
        assert_eq!(claim.merchant("m1").await.unwrap().map(|m| m.id), Some("m1".to_string()));
        assert!(claim.merchant("m2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attempt_cap_excludes_exhausted_rows() {
        let store = InMemoryNotificationStore::new();
        store.insert_if_absent(&new_notification("t1", "REFUND")).await.unwrap();
        for _ in 0..2 {
            let mut claim = store.claim(Psp::Adyen, 10, 2).await.unwrap();
            let id = claim.notifications()[0].id.clone();
            claim.mark(&id, NotificationStatus::Fail).await.unwrap();
            claim.commit().await.unwrap();
        }
        assert!(store.claim(Psp::Adyen, 10, 2).await.unwrap().notifications().is_empty());
        assert_eq!(store.claim(Psp::Adyen, 10, 0).await.unwrap().notifications().len(), 1);
    }
}
