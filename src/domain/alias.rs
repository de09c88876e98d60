use crate::domain::merchant::Psp;
use crate::domain::transaction::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CcConfig {
    pub cc_mask: Option<String>,
    pub cc_expiry: Option<String>,
    pub cc_type: Option<String>,
    pub cc_holder_name: Option<String>,
    pub nonce: Option<String>,
    pub device_data: Option<String>,
    pub encrypted_card_number: Option<String>,
    pub encrypted_expiry_month: Option<String>,
    pub encrypted_expiry_year: Option<String>,
    pub encrypted_security_code: Option<String>,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SepaConfig {
    pub iban: Option<String>,
    pub bic: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalConfig {
    pub nonce: Option<String>,
    pub device_data: Option<String>,
    pub billing_agreement_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalData {
    pub email: Option<String>,
    pub customer_ip: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub customer_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasExtra {
    pub payment_method: PaymentMethod,
    pub cc_config: Option<CcConfig>,
    pub sepa_config: Option<SepaConfig>,
    pub pay_pal_config: Option<PayPalConfig>,
    pub personal_data: Option<PersonalData>,
    pub channel: Option<String>,
}

impl AliasExtra {
    pub fn new(payment_method: PaymentMethod) -> Self {
        Self {
            payment_method,
            cc_config: None,
            sepa_config: None,
            pay_pal_config: None,
            personal_data: None,
            channel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: String,
    pub merchant_id: String,
    pub psp: Psp,
    pub idempotency_key: String,
    pub user_agent: Option<String>,
    pub psp_alias: Option<String>,
    pub extra: Option<AliasExtra>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRequest {
    pub psp_alias: Option<String>,
    pub extra: Option<AliasExtra>,
}
