use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Psp {
    BsPayone,
    Adyen,
    Braintree,
    Mock,
}

impl Psp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Psp::BsPayone => "BS_PAYONE",
            Psp::Adyen => "ADYEN",
            Psp::Braintree => "BRAINTREE",
            Psp::Mock => "MOCK",
        }
    }
}

impl fmt::Display for Psp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Psp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "BS_PAYONE" => Ok(Psp::BsPayone),
            "ADYEN" => Ok(Psp::Adyen),
            "BRAINTREE" => Ok(Psp::Braintree),
            "MOCK" => Ok(Psp::Mock),
            other => Err(anyhow::anyhow!("unknown psp {other}")),
        }
    }
}

/// Per-provider merchant configuration. Holds secrets; never returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PspConfig {
    #[serde(rename = "type")]
    pub psp: Option<Psp>,
    pub merchant_id: Option<String>,
    pub portal_id: Option<String>,
    pub key: Option<String>,
    pub account_id: Option<String>,
    pub sandbox_merchant_id: Option<String>,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
    pub sandbox_public_key: Option<String>,
    pub sandbox_private_key: Option<String>,
    pub api_key: Option<String>,
    pub sandbox_api_key: Option<String>,
    pub client_encryption_key: Option<String>,
    pub sandbox_client_encryption_key: Option<String>,
    pub currency: Option<String>,
    pub country: Option<String>,
    pub locale: Option<String>,
}

impl PspConfig {
    pub fn merchant_account(&self, test_mode: bool) -> Option<&str> {
        if test_mode {
            self.sandbox_merchant_id.as_deref().or(self.merchant_id.as_deref())
        } else {
            self.merchant_id.as_deref()
        }
    }

    pub fn api_key_for(&self, test_mode: bool) -> Option<&str> {
        if test_mode {
            self.sandbox_api_key.as_deref()
        } else {
            self.api_key.as_deref()
        }
    }

    pub fn key_pair_for(&self, test_mode: bool) -> Option<(&str, &str)> {
        let (public, private) = if test_mode {
            (&self.sandbox_public_key, &self.sandbox_private_key)
        } else {
            (&self.public_key, &self.private_key)
        };
        Some((public.as_deref()?, private.as_deref()?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub psp_configs: Vec<PspConfig>,
    pub webhook_url: Option<String>,
    pub webhook_username: Option<String>,
    pub webhook_password: Option<String>,
}

impl Merchant {
    pub fn psp_config(&self, psp: Psp) -> Option<&PspConfig> {
        self.psp_configs.iter().find(|c| c.psp == Some(psp))
    }
}
