use crate::domain::merchant::{Merchant, PspConfig};
use crate::repo::store::MerchantStore;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Row};

#[derive(Clone)]
pub struct MerchantsRepo {
    pub pool: PgPool,
}

pub(crate) async fn fetch_merchant<'e, E>(executor: E, merchant_id: &str) -> Result<Option<Merchant>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, psp_config, webhook_url, webhook_username, webhook_password FROM merchant WHERE id = $1",
    )
    .bind(merchant_id)
    .fetch_optional(executor)
    .await?;

    let Some(r) = row else {
        return Ok(None);
    };
    let psp_config: serde_json::Value = r.get("psp_config");
    Ok(Some(Merchant {
        id: r.get("id"),
        psp_configs: serde_json::from_value::<Vec<PspConfig>>(psp_config)?,
        webhook_url: r.get("webhook_url"),
        webhook_username: r.get("webhook_username"),
        webhook_password: r.get("webhook_password"),
    }))
}

#[async_trait]
impl MerchantStore for MerchantsRepo {
    async fn find(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        fetch_merchant(&self.pool, merchant_id).await
    }
}
