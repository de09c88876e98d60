use crate::domain::alias::{Alias, AliasRequest};
use crate::domain::error::{ApiError, ApiErrorCode};
use crate::domain::merchant::{Merchant, Psp, PspConfig};
use crate::domain::transaction::Executed;
use crate::gateways::registry::PspRegistry;
use crate::gateways::{
    DynamicPspConfig, PspAliasConfig, PspDeleteAliasRequest, PspGateway, PspRegisterAliasRequest,
};
use crate::repo::store::{AliasStore, InsertOutcome, MerchantStore};
use crate::service::transaction_service::{psp_failure, random_alphanumeric};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const ALIAS_ID_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasResponse {
    pub alias_id: String,
    pub psp_config: Option<PspAliasConfig>,
}

#[derive(Clone)]
pub struct AliasService {
    pub merchants: Arc<dyn MerchantStore>,
    pub aliases: Arc<dyn AliasStore>,
    pub registry: PspRegistry,
}

impl AliasService {
    pub fn new(merchants: Arc<dyn MerchantStore>, aliases: Arc<dyn AliasStore>, registry: PspRegistry) -> Self {
        Self {
            merchants,
            aliases,
            registry,
        }
    }

    /// Reserves an alias id for `psp` and returns the client-side provider config.
    /// Repeating the call with the same key and user agent returns the same alias.
    pub async fn create_alias(
        &self,
        merchant_id: &str,
        psp: Psp,
        idempotency_key: Option<&str>,
        user_agent: Option<&str>,
        test_mode: bool,
        dynamic_config: &DynamicPspConfig,
    ) -> Result<Executed<AliasResponse>, ApiError> {
        let key = idempotency_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::of(ApiErrorCode::MissingIdempotencyKey))?;
        let merchant = self.load_merchant(merchant_id).await?;
        let (psp_config, gateway) = self.provider_for(&merchant, psp)?;

        let psp_config_view = gateway
            .calculate_config(Some(&psp_config), dynamic_config, test_mode)
            .await
            .map_err(|e| psp_failure(e, "calculate_config"))?;

        if let Some(existing) = self
            .aliases
            .find_by_idempotency(merchant_id, key, psp, user_agent)
            .await
            .map_err(ApiError::internal)?
        {
            return Ok(Executed {
                value: AliasResponse {
                    alias_id: existing.id,
                    psp_config: psp_config_view,
                },
                created: false,
            });
        }

        let alias = Alias {
            id: random_alphanumeric(ALIAS_ID_LEN),
            merchant_id: merchant_id.to_string(),
            psp,
            idempotency_key: key.to_string(),
            user_agent: user_agent.map(str::to_string),
            psp_alias: None,
            extra: None,
            active: true,
            created_at: Utc::now(),
        };
        let (alias_id, created) = match self.aliases.insert(&alias).await.map_err(ApiError::internal)? {
            InsertOutcome::Inserted => (alias.id, true),
            InsertOutcome::Duplicate(existing) => (existing.id, false),
        };
        if created {
            info!(psp = %psp, merchant_id = %merchant_id, alias_id = %alias_id, "alias created");
        }
        Ok(Executed {
            value: AliasResponse {
                alias_id,
                psp_config: psp_config_view,
            },
            created,
        })
    }

    /// Registers the client-collected payment details with the provider and stores the result.
    pub async fn exchange_alias(
        &self,
        merchant_id: &str,
        alias_id: &str,
        test_mode: bool,
        request: &AliasRequest,
    ) -> Result<Alias, ApiError> {
        if request.psp_alias.is_none() && request.extra.is_none() {
            return Err(ApiError::with_message(
                ApiErrorCode::ValidationError,
                "pspAlias or extra is required",
            ));
        }
        let merchant = self.load_merchant(merchant_id).await?;
        let mut alias = self.owned_alias(&merchant, alias_id).await?;
        let (psp_config, gateway) = self.provider_for(&merchant, alias.psp)?;

        let registered = gateway
            .register_alias(
                &PspRegisterAliasRequest {
                    alias_id: alias.id.clone(),
                    extra: request.extra.clone(),
                    psp_config,
                },
                test_mode,
            )
            .await
            .map_err(|e| psp_failure(e, "register_alias"))?;

        let (registered_alias, registered_extra) = registered
            .map(|r| (r.psp_alias, r.extra))
            .unwrap_or_default();
        alias.psp_alias = request.psp_alias.clone().or(registered_alias);
        alias.extra = registered_extra.or_else(|| request.extra.clone());
        self.aliases.update(&alias).await.map_err(ApiError::internal)?;
        info!(psp = %alias.psp, alias_id = %alias.id, "alias exchanged");
        Ok(alias)
    }

    /// Deactivates the alias. The provider-side delete is best effort.
    pub async fn delete_alias(&self, merchant_id: &str, alias_id: &str, test_mode: bool) -> Result<(), ApiError> {
        let merchant = self.load_merchant(merchant_id).await?;
        let alias = self.owned_alias(&merchant, alias_id).await?;
        let extra = alias
            .extra
            .as_ref()
            .ok_or_else(|| ApiError::of(ApiErrorCode::IncompleteAlias))?;
        let (psp_config, gateway) = self.provider_for(&merchant, alias.psp)?;

        gateway
            .delete_alias(
                &PspDeleteAliasRequest {
                    alias_id: alias.id.clone(),
                    psp_alias: alias.psp_alias.clone(),
                    payment_method: Some(extra.payment_method),
                    customer_reference: extra
                        .personal_data
                        .as_ref()
                        .and_then(|p| p.customer_reference.clone()),
                    psp_config,
                },
                test_mode,
            )
            .await;

        if !self.aliases.deactivate(&alias.id).await.map_err(ApiError::internal)? {
            return Err(ApiError::of(ApiErrorCode::AliasNotFound));
        }
        info!(psp = %alias.psp, alias_id = %alias.id, "alias deleted");
        Ok(())
    }

    async fn load_merchant(&self, merchant_id: &str) -> Result<Merchant, ApiError> {
        self.merchants
            .find(merchant_id)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::of(ApiErrorCode::MerchantNotFound))
    }

    async fn owned_alias(&self, merchant: &Merchant, alias_id: &str) -> Result<Alias, ApiError> {
        let alias = self
            .aliases
            .find_active(alias_id)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::of(ApiErrorCode::AliasNotFound))?;
        if alias.merchant_id != merchant.id {
            return Err(ApiError::of(ApiErrorCode::WrongAliasMerchantMapping));
        }
        Ok(alias)
    }

    fn provider_for(&self, merchant: &Merchant, psp: Psp) -> Result<(PspConfig, Arc<dyn PspGateway>), ApiError> {
        let psp_config = merchant.psp_config(psp).cloned().ok_or_else(|| {
            ApiError::with_message(
                ApiErrorCode::PspConfForMerchantNotFound,
                format!("PSP configuration for '{psp}' cannot be found from given merchant"),
            )
        })?;
        let gateway = self.registry.find(psp).ok_or_else(|| {
            ApiError::with_message(
                ApiErrorCode::PspImplNotFound,
                format!("PSP implementation '{psp}' cannot be found"),
            )
        })?;
        Ok((psp_config, gateway))
    }
}
