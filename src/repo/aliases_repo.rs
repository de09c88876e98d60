use crate::domain::alias::{Alias, AliasExtra};
use crate::domain::merchant::Psp;
use crate::repo::store::{AliasStore, InsertOutcome};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct AliasesRepo {
    pub pool: PgPool,
}

fn map_row(r: &PgRow) -> Result<Alias> {
    let psp: String = r.get("psp");
    let user_agent: String = r.get("user_agent");
    let extra: Option<serde_json::Value> = r.get("extra");
    Ok(Alias {
        id: r.get("id"),
        merchant_id: r.get("merchant_id"),
        psp: psp.parse()?,
        idempotency_key: r.get("idempotency_key"),
        user_agent: Some(user_agent).filter(|ua| !ua.is_empty()),
        psp_alias: r.get("psp_alias"),
        extra: extra.map(serde_json::from_value::<AliasExtra>).transpose()?,
        active: r.get("active"),
        created_at: r.get("created_at"),
    })
}

fn extra_json(alias: &Alias) -> Result<Option<serde_json::Value>> {
    Ok(alias.extra.as_ref().map(serde_json::to_value).transpose()?)
}

#[async_trait]
impl AliasStore for AliasesRepo {
    async fn find_active(&self, alias_id: &str) -> Result<Option<Alias>> {
        let row = sqlx::query(
            r#"
            SELECT id, merchant_id, psp, idempotency_key, user_agent, psp_alias, extra, active, created_at
            FROM alias
            WHERE id = $1 AND active = TRUE
            "#,
        )
        .bind(alias_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_row).transpose()
    }

    async fn find_by_idempotency(
        &self,
        merchant_id: &str,
        idempotency_key: &str,
        psp: Psp,
        user_agent: Option<&str>,
    ) -> Result<Option<Alias>> {
        let row = sqlx::query(
            r#"
            SELECT id, merchant_id, psp, idempotency_key, user_agent, psp_alias, extra, active, created_at
            FROM alias
            WHERE merchant_id = $1 AND idempotency_key = $2 AND psp = $3 AND user_agent = $4
            "#,
        )
        .bind(merchant_id)
        .bind(idempotency_key)
        .bind(psp.as_str())
        .bind(user_agent.unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_row).transpose()
    }

    async fn insert(&self, alias: &Alias) -> Result<InsertOutcome<Alias>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO alias (id, merchant_id, psp, idempotency_key, user_agent, psp_alias, extra, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (merchant_id, idempotency_key, psp, user_agent) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&alias.id)
        .bind(&alias.merchant_id)
        .bind(alias.psp.as_str())
        .bind(&alias.idempotency_key)
        .bind(alias.user_agent.as_deref().unwrap_or_default())
        .bind(&alias.psp_alias)
        .bind(extra_json(alias)?)
        .bind(alias.active)
        .bind(alias.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(InsertOutcome::Inserted);
        }
        let existing = self
            .find_by_idempotency(
                &alias.merchant_id,
                &alias.idempotency_key,
                alias.psp,
                alias.user_agent.as_deref(),
            )
            .await?
            .ok_or_else(|| anyhow::anyhow!("conflicting alias row vanished"))?;
        Ok(InsertOutcome::Duplicate(existing))
    }

    async fn update(&self, alias: &Alias) -> Result<()> {
        sqlx::query(
            "UPDATE alias SET psp_alias = $2, extra = $3, updated_at = now() WHERE id = $1 AND active = TRUE",
        )
        .bind(&alias.id)
        .bind(&alias.psp_alias)
        .bind(extra_json(alias)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate(&self, alias_id: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE alias SET active = FALSE, updated_at = now() WHERE id = $1 AND active = TRUE")
            .bind(alias_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
