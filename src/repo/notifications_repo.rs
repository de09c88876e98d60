use crate::domain::merchant::{Merchant, Psp};
use crate::domain::notification::{Notification, NotificationId, NotificationStatus};
use crate::domain::transaction::TransactionRecord;
use crate::repo::merchants_repo::fetch_merchant;
use crate::repo::transactions_repo::latest_by_psp_transaction_id;
use crate::repo::store::{NewNotification, NotificationClaim, NotificationStore};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

#[derive(Clone)]
pub struct NotificationsRepo {
    pub pool: PgPool,
}

fn map_row(r: &PgRow) -> Result<Notification> {
    let status: String = r.get("status");
    let psp: String = r.get("psp");
    Ok(Notification {
        id: NotificationId::new(
            r.get::<String, _>("psp_transaction_id"),
            r.get::<String, _>("psp_event"),
        ),
        status: status.parse()?,
        psp: psp.parse()?,
        message: r.get("message"),
        attempts: r.get("attempts"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

/// Row locks live as long as the database transaction.
pub struct PgNotificationClaim {
    tx: Transaction<'static, Postgres>,
    rows: Vec<Notification>,
}

#[async_trait]
impl NotificationClaim for PgNotificationClaim {
    fn notifications(&self) -> &[Notification] {
        &self.rows
    }

    async fn owning_transaction(&mut self, psp_transaction_id: &str) -> Result<Option<TransactionRecord>> {
        latest_by_psp_transaction_id(self.tx.as_mut(), psp_transaction_id).await
    }

    async fn merchant(&mut self, merchant_id: &str) -> Result<Option<Merchant>> {
        fetch_merchant(self.tx.as_mut(), merchant_id).await
    }

    async fn mark(&mut self, id: &NotificationId, status: NotificationStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification
            SET status = $3, attempts = attempts + 1, updated_at = now()
            WHERE psp_transaction_id = $1 AND psp_event = $2
            "#,
        )
        .bind(&id.psp_transaction_id)
        .bind(&id.psp_event)
        .bind(status.as_str())
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for NotificationsRepo {
    async fn insert_if_absent(&self, notification: &NewNotification) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO notification (psp_transaction_id, psp_event, status, psp, message, attempts)
            VALUES ($1, $2, 'CREATED', $3, $4, 0)
            ON CONFLICT (psp_transaction_id, psp_event) DO NOTHING
            "#,
        )
        .bind(&notification.id.psp_transaction_id)
        .bind(&notification.id.psp_event)
        .bind(notification.psp.as_str())
        .bind(&notification.message)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn claim(&self, psp: Psp, limit: i64, max_attempts: i32) -> Result<Box<dyn NotificationClaim>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            r#"
            SELECT psp_transaction_id, psp_event, status, psp, message, attempts, created_at, updated_at
            FROM notification
            WHERE psp = $1
              AND status IN ('CREATED', 'FAIL')
              AND ($3 = 0 OR attempts < $3)
            ORDER BY created_at DESC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(psp.as_str())
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(tx.as_mut())
        .await?;

        let rows = rows.iter().map(map_row).collect::<Result<Vec<_>>>()?;
        Ok(Box::new(PgNotificationClaim { tx, rows }))
    }

    async fn find(&self, id: &NotificationId) -> Result<Option<Notification>> {
        let row = sqlx::query(
            r#"
            SELECT psp_transaction_id, psp_event, status, psp, message, attempts, created_at, updated_at
            FROM notification
            WHERE psp_transaction_id = $1 AND psp_event = $2
            "#,
        )
        .bind(&id.psp_transaction_id)
        .bind(&id.psp_event)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_row).transpose()
    }
}
