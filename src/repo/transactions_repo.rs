use crate::domain::transaction::{TransactionAction, TransactionRecord};
use crate::repo::store::{InsertOutcome, TransactionScope, TransactionStore};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};

const COLUMNS: &str = r#"
    transaction_id, idempotency_key, action, status, amount, currency, payment_method,
    psp_transaction_id, psp_customer_id, merchant_id, alias_id, merchant_transaction_id,
    merchant_customer_id, reason, psp_test_mode, request_hash, error_kind, error_message, created_at
"#;

fn map_row(r: &PgRow) -> Result<TransactionRecord> {
    let action: String = r.get("action");
    let status: String = r.get("status");
    let payment_method: String = r.get("payment_method");
    let error_kind: Option<String> = r.get("error_kind");
    Ok(TransactionRecord {
        transaction_id: r.get("transaction_id"),
        idempotency_key: r.get("idempotency_key"),
        action: action.parse()?,
        status: status.parse()?,
        amount: r.get("amount"),
        currency: r.get("currency"),
        payment_method: payment_method.parse()?,
        psp_transaction_id: r.get("psp_transaction_id"),
        psp_customer_id: r.get("psp_customer_id"),
        merchant_id: r.get("merchant_id"),
        alias_id: r.get("alias_id"),
        merchant_transaction_id: r.get("merchant_transaction_id"),
        merchant_customer_id: r.get("merchant_customer_id"),
        reason: r.get("reason"),
        psp_test_mode: r.get("psp_test_mode"),
        request_hash: r.get("request_hash"),
        error_kind: error_kind.map(|k| k.parse()).transpose()?,
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
    })
}

/// Latest row carrying the provider reference.
pub(crate) async fn latest_by_psp_transaction_id<'e, E>(
    executor: E,
    psp_transaction_id: &str,
) -> Result<Option<TransactionRecord>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM transaction_record WHERE psp_transaction_id = $1 ORDER BY id DESC LIMIT 1"
    ))
    .bind(psp_transaction_id)
    .fetch_optional(executor)
    .await?;
    row.as_ref().map(map_row).transpose()
}

#[derive(Clone)]
pub struct TransactionsRepo {
    pub pool: PgPool,
}

/// Database transaction holding a transaction-scoped advisory lock on the scope key.
pub struct PgTransactionScope {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TransactionScope for PgTransactionScope {
    async fn find_by_idempotency(
        &mut self,
        merchant_id: &str,
        idempotency_key: &str,
        action: TransactionAction,
    ) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transaction_record WHERE merchant_id = $1 AND idempotency_key = $2 AND action = $3"
        ))
        .bind(merchant_id)
        .bind(idempotency_key)
        .bind(action.as_str())
        .fetch_optional(self.tx.as_mut())
        .await?;
        row.as_ref().map(map_row).transpose()
    }

    async fn list_by_transaction_id(&mut self, transaction_id: &str) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transaction_record WHERE transaction_id = $1 ORDER BY id ASC"
        ))
        .bind(transaction_id)
        .fetch_all(self.tx.as_mut())
        .await?;
        rows.iter().map(map_row).collect()
    }

    async fn insert(&mut self, record: &TransactionRecord) -> Result<InsertOutcome<TransactionRecord>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO transaction_record (
                transaction_id, idempotency_key, action, status, amount, currency, payment_method,
                psp_transaction_id, psp_customer_id, merchant_id, alias_id, merchant_transaction_id,
                merchant_customer_id, reason, psp_test_mode, request_hash, error_kind, error_message, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19
            )
            ON CONFLICT (merchant_id, idempotency_key, action) DO NOTHING
            RETURNING transaction_id
            "#,
        )
        .bind(&record.transaction_id)
        .bind(&record.idempotency_key)
        .bind(record.action.as_str())
        .bind(record.status.as_str())
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.payment_method.as_str())
        .bind(&record.psp_transaction_id)
        .bind(&record.psp_customer_id)
        .bind(&record.merchant_id)
        .bind(&record.alias_id)
        .bind(&record.merchant_transaction_id)
        .bind(&record.merchant_customer_id)
        .bind(&record.reason)
        .bind(record.psp_test_mode)
        .bind(&record.request_hash)
        .bind(record.error_kind.map(|k| k.as_str()))
        .bind(&record.error_message)
        .bind(record.created_at)
        .fetch_optional(self.tx.as_mut())
        .await?;

        if inserted.is_some() {
            return Ok(InsertOutcome::Inserted);
        }
        let existing = self
            .find_by_idempotency(&record.merchant_id, &record.idempotency_key, record.action)
            .await?
            .ok_or_else(|| anyhow::anyhow!("conflicting transaction row vanished"))?;
        Ok(InsertOutcome::Duplicate(existing))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for TransactionsRepo {
    async fn begin(&self, lock_key: &str) -> Result<Box<dyn TransactionScope>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key)
            .execute(tx.as_mut())
            .await?;
        Ok(Box::new(PgTransactionScope { tx }))
    }

    async fn list_by_transaction_id(&self, transaction_id: &str) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transaction_record WHERE transaction_id = $1 ORDER BY id ASC"
        ))
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }
}
