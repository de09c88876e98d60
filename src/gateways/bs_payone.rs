use crate::domain::merchant::{Psp, PspConfig};
use crate::domain::notification::{
    InboundNotification, Notification, NotificationAction, NotificationId, PspNotification,
};
use crate::domain::transaction::{PaymentMethod, TransactionStatus};
use crate::gateways::error_codes::map_provider_code;
use crate::gateways::{
    require, truncate, DynamicPspConfig, PspAliasConfig, PspCaptureRequest, PspDeleteAliasRequest,
    PspError, PspGateway, PspOutcome, PspPaymentRequest, PspRefundRequest, PspRegisterAliasRequest,
    PspRegisterAliasResponse, PspReversalRequest,
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha384};
use std::collections::HashMap;
use tracing::{error, info, warn};

const CREDIT_CARD_CHECK: &str = "creditcardcheck";
const RESPONSE_TYPE: &str = "JSON";
const STORE_CARD_DATA: &str = "yes";
const REFERENCE_LENGTH: usize = 10;

pub struct BsPayoneGateway {
    pub base_url: String,
    pub api_version: String,
    pub encoding: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

fn mode(test_mode: bool) -> &'static str {
    if test_mode {
        "test"
    } else {
        "live"
    }
}

pub fn hmac_sha384_hex(key: &str, data: &str) -> Result<String, PspError> {
    let mut mac = Hmac::<Sha384>::new_from_slice(key.as_bytes())
        .map_err(|e| PspError::Configuration(format!("invalid BS Payone key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn hash_key(key: &str) -> String {
    hex::encode(Sha384::digest(key.as_bytes()))
}

/// Server API answers with `key=value` lines.
pub fn parse_key_values(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect()
}

fn clearing_type(method: PaymentMethod) -> Result<(&'static str, Option<&'static str>), PspError> {
    match method {
        PaymentMethod::Cc => Ok(("cc", None)),
        PaymentMethod::Sepa => Ok(("elv", None)),
        PaymentMethod::PayPal => Ok(("wlt", Some("PPE"))),
        other => Err(PspError::UnsupportedOperation(format!(
            "{} is not supported by BS Payone",
            other.as_str()
        ))),
    }
}

/// Converts a decimal major-unit price such as `12.5` into minor units.
fn price_to_minor(price: &str) -> Option<i64> {
    let price = price.trim();
    let negative = price.starts_with('-');
    let digits = price.trim_start_matches('-');
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if frac.len() > 2 {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = format!("{frac:0<2}").parse().ok()?;
    let minor = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -minor } else { minor })
}

fn txaction_to_action(txaction: &str, price: Option<i64>) -> NotificationAction {
    match txaction {
        "appointed" => NotificationAction::Auth,
        "capture" => NotificationAction::Capture,
        "debit" if price.map(|p| p < 0).unwrap_or(false) => NotificationAction::Refund,
        "refund" => NotificationAction::Refund,
        "cancelation" => NotificationAction::Chargeback,
        _ => NotificationAction::Additional,
    }
}

fn reference() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_LENGTH)
        .map(char::from)
        .collect()
}

impl BsPayoneGateway {
    fn standard_params(
        &self,
        cfg: &PspConfig,
        request: &str,
        test_mode: bool,
    ) -> Result<Vec<(&'static str, String)>, PspError> {
        Ok(vec![
            ("mid", require(&cfg.merchant_id, "BS Payone merchant id")?.to_string()),
            ("portalid", require(&cfg.portal_id, "BS Payone portal id")?.to_string()),
            ("key", hash_key(require(&cfg.key, "BS Payone key")?)),
            ("api_version", self.api_version.clone()),
            ("mode", mode(test_mode).to_string()),
            ("request", request.to_string()),
            ("encoding", self.encoding.clone()),
        ])
    }

    async fn post(&self, params: Vec<(&'static str, String)>) -> Result<HashMap<String, String>, PspError> {
        let resp = self
            .client
            .post(&self.base_url)
            .form(&params)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PspError::Transport(format!(
                "BS Payone answered HTTP {}: {}",
                status.as_u16(),
                truncate(&body)
            )));
        }
        Ok(parse_key_values(&body))
    }

    fn outcome(&self, operation: &str, fields: HashMap<String, String>) -> PspOutcome {
        let txid = fields.get("txid").cloned();
        match fields.get("status").map(String::as_str) {
            Some("APPROVED") | Some("PENDING") | Some("REDIRECT") => PspOutcome::Approved {
                psp_transaction_id: txid,
                customer_id: fields.get("userid").cloned(),
            },
            _ => {
                let code = fields.get("errorcode").cloned().unwrap_or_default();
                let message = fields.get("errormessage").cloned();
                error!(operation, error_code = %code, "BS Payone declined the request");
                PspOutcome::Declined {
                    psp_transaction_id: txid,
                    kind: map_provider_code(Psp::BsPayone, &code),
                    message,
                }
            }
        }
    }

    async fn payment(
        &self,
        request_type: &str,
        request: &PspPaymentRequest,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError> {
        let cfg = &request.psp_config;
        let (clearing, wallet) = clearing_type(request.extra.payment_method)?;
        let mut params = self.standard_params(cfg, request_type, test_mode)?;
        params.push(("aid", require(&cfg.account_id, "BS Payone account id")?.to_string()));
        params.push(("clearingtype", clearing.to_string()));
        params.push(("reference", request.purchase_id.clone().unwrap_or_else(reference)));
        params.push(("amount", request.payment_data.amount.to_string()));
        params.push(("currency", request.payment_data.currency.clone()));
        params.push(("customerid", request.alias_id.clone()));
        if let Some(wallet) = wallet {
            params.push(("wallettype", wallet.to_string()));
        }
        if let Some(personal) = &request.extra.personal_data {
            for (name, value) in [
                ("lastname", &personal.last_name),
                ("country", &personal.country),
                ("city", &personal.city),
            ] {
                if let Some(v) = value {
                    params.push((name, v.clone()));
                }
            }
        }
        match request.extra.payment_method {
            PaymentMethod::Sepa => {
                let sepa = request.extra.sepa_config.clone().unwrap_or_default();
                params.push(("iban", require(&sepa.iban, "IBAN")?.to_string()));
                if let Some(bic) = sepa.bic {
                    params.push(("bic", bic));
                }
            }
            _ => {
                if let Some(alias) = &request.psp_alias {
                    params.push(("pseudocardpan", alias.clone()));
                }
            }
        }
        info!(alias_id = %request.alias_id, request_type, mode = mode(test_mode), "BS Payone payment");
        let fields = self.post(params).await?;
        Ok(self.outcome(request_type, fields))
    }

    async fn modification(
        &self,
        request_type: &str,
        request: &PspCaptureRequest,
        amount: i64,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError> {
        let mut params = self.standard_params(&request.psp_config, request_type, test_mode)?;
        params.push(("txid", request.psp_transaction_id.clone()));
        params.push(("amount", amount.to_string()));
        params.push(("currency", request.currency.clone()));
        let fields = self.post(params).await?;
        Ok(self.outcome(request_type, fields))
    }
}

#[async_trait::async_trait]
impl PspGateway for BsPayoneGateway {
    fn provider(&self) -> Psp {
        Psp::BsPayone
    }

    async fn calculate_config(
        &self,
        psp_config: Option<&PspConfig>,
        _dynamic_config: &DynamicPspConfig,
        test_mode: bool,
    ) -> Result<Option<PspAliasConfig>, PspError> {
        let Some(cfg) = psp_config else {
            return Ok(None);
        };
        let key = require(&cfg.key, "BS Payone key")?;
        let data = format!(
            "{}{}{}{}{}{}{}{}",
            cfg.account_id.as_deref().unwrap_or_default(),
            self.api_version,
            cfg.merchant_id.as_deref().unwrap_or_default(),
            mode(test_mode),
            cfg.portal_id.as_deref().unwrap_or_default(),
            CREDIT_CARD_CHECK,
            RESPONSE_TYPE,
            STORE_CARD_DATA,
        );
        Ok(Some(PspAliasConfig {
            psp: Some(Psp::BsPayone),
            merchant_id: cfg.merchant_id.clone(),
            portal_id: cfg.portal_id.clone(),
            request: Some(CREDIT_CARD_CHECK.to_string()),
            api_version: Some(self.api_version.clone()),
            response_type: Some(RESPONSE_TYPE.to_string()),
            hash: Some(hmac_sha384_hex(key, &data)?),
            account_id: cfg.account_id.clone(),
            encoding: Some(self.encoding.clone()),
            mode: Some(mode(test_mode).to_string()),
            ..Default::default()
        }))
    }

    async fn register_alias(
        &self,
        request: &PspRegisterAliasRequest,
        _test_mode: bool,
    ) -> Result<Option<PspRegisterAliasResponse>, PspError> {
        if let Some(extra) = &request.extra {
            clearing_type(extra.payment_method)?;
        }
        // The pseudo card PAN is produced client side by the hosted check.
        Ok(None)
    }

    async fn preauthorize(&self, request: &PspPaymentRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.payment("preauthorization", request, test_mode).await
    }

    async fn authorize(&self, request: &PspPaymentRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.payment("authorization", request, test_mode).await
    }

    async fn capture(&self, request: &PspCaptureRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.modification("capture", request, request.amount, test_mode).await
    }

    async fn reverse(&self, request: &PspReversalRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        // A zero-amount capture releases the reservation.
        self.modification("capture", request, 0, test_mode).await
    }

    async fn refund(&self, request: &PspRefundRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.modification("refund", request, -request.amount, test_mode).await
    }

    async fn delete_alias(&self, request: &PspDeleteAliasRequest, test_mode: bool) {
        let method = request.payment_method;
        let flag = |m: PaymentMethod| if method == Some(m) { "yes" } else { "no" }.to_string();
        let params = match self.standard_params(&request.psp_config, "updateuser", test_mode) {
            Ok(mut params) => {
                params.push(("customerid", request.alias_id.clone()));
                params.push(("delete_carddata", flag(PaymentMethod::Cc)));
                params.push(("delete_bankaccountdata", flag(PaymentMethod::Sepa)));
                params
            }
            Err(e) => {
                warn!(alias_id = %request.alias_id, error = %e, "BS Payone alias deletion skipped");
                return;
            }
        };
        match self.post(params).await {
            Ok(fields) if fields.get("status").map(String::as_str) == Some("ERROR") => {
                error!(
                    alias_id = %request.alias_id,
                    error_code = fields.get("errorcode").map(String::as_str).unwrap_or_default(),
                    "BS Payone alias deletion failed"
                );
            }
            Ok(_) => {}
            Err(e) => error!(alias_id = %request.alias_id, error = %e, "BS Payone alias deletion failed"),
        }
    }

    fn extract_notifications(&self, body: &[u8]) -> Result<Vec<InboundNotification>, PspError> {
        let fields: HashMap<String, String> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let txid = fields
            .get("txid")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PspError::Configuration("notification without txid".to_string()))?;
        let txaction = fields
            .get("txaction")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PspError::Configuration("notification without txaction".to_string()))?;
        let event = match fields.get("sequencenumber") {
            Some(seq) if !seq.is_empty() => format!("{txaction}_{seq}"),
            _ => txaction.clone(),
        };
        // The portal key is a credential and is not persisted.
        let message: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .filter(|(k, _)| k.as_str() != "key")
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        Ok(vec![InboundNotification {
            id: NotificationId::new(txid.clone(), event),
            message: serde_json::Value::Object(message),
        }])
    }

    fn parse_notification(&self, notification: &Notification) -> Result<PspNotification, PspError> {
        let field = |name: &str| {
            notification
                .message
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let txaction = field("txaction")
            .ok_or_else(|| PspError::Configuration("stored notification without txaction".to_string()))?;
        let price = field("price").as_deref().and_then(price_to_minor);
        let action = txaction_to_action(&txaction, price);
        Ok(PspNotification {
            psp_transaction_id: notification.id.psp_transaction_id.clone(),
            action,
            status: if txaction == "failed" {
                TransactionStatus::Fail
            } else {
                TransactionStatus::Success
            },
            amount: price.map(i64::abs),
            currency: field("currency"),
            reason: if action == NotificationAction::Additional {
                Some(txaction)
            } else {
                None
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_api_lines() {
        let fields = parse_key_values("status=ERROR\nerrorcode=917\r\nerrormessage=Limit exceeded\n");
        assert_eq!(fields.get("status").map(String::as_str), Some("ERROR"));
        assert_eq!(fields.get("errorcode").map(String::as_str), Some("917"));
        assert_eq!(fields.get("errormessage").map(String::as_str), Some("Limit exceeded"));
    }

    #[test]
    fn converts_prices_to_minor_units() {
        assert_eq!(price_to_minor("12.5"), Some(1250));
        assert_eq!(price_to_minor("-3.00"), Some(-300));
        assert_eq!(price_to_minor("7"), Some(700));
        assert_eq!(price_to_minor("1.234"), None);
    }

    #[test]
    fn hmac_is_hex_encoded_sha384() {
        let hash = hmac_sha384_hex("secret", "payload").unwrap();
        assert_eq!(hash.len(), 96);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debit_with_negative_price_is_a_refund() {
        assert_eq!(txaction_to_action("debit", Some(-100)), NotificationAction::Refund);
        assert_eq!(txaction_to_action("debit", Some(100)), NotificationAction::Additional);
        assert_eq!(txaction_to_action("appointed", None), NotificationAction::Auth);
    }
}
