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
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

const API_KEY_HEADER: &str = "X-API-Key";

pub struct AdyenGateway {
    pub base_url: String,
    pub test_base_url: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdyenResponse {
    psp_reference: Option<String>,
    result_code: Option<String>,
    response: Option<String>,
    refusal_reason: Option<String>,
    refusal_reason_code: Option<String>,
    error_code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    additional_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdyenNotificationRequest {
    #[serde(default)]
    notification_items: Vec<AdyenNotificationItemWrapper>,
}

#[derive(Debug, Deserialize)]
struct AdyenNotificationItemWrapper {
    #[serde(rename = "NotificationRequestItem")]
    item: Value,
}

pub fn event_to_action(event_code: &str) -> NotificationAction {
    match event_code {
        "AUTHORISATION" => NotificationAction::Auth,
        "CAPTURE" => NotificationAction::Capture,
        "REFUND" => NotificationAction::Refund,
        "CANCELLATION" => NotificationAction::Reversal,
        "CHARGEBACK" => NotificationAction::Chargeback,
        "CHARGEBACK_REVERSED" => NotificationAction::ChargebackReversed,
        _ => NotificationAction::Additional,
    }
}

fn outcome(operation: &str, resp: AdyenResponse) -> PspOutcome {
    let approved = match resp.result_code.as_deref() {
        Some(code) => matches!(code, "Authorised" | "Received" | "Pending"),
        None => resp
            .response
            .as_deref()
            .map(|r| r.ends_with("-received]"))
            .unwrap_or(false),
    };
    if approved {
        return PspOutcome::Approved {
            psp_transaction_id: resp.psp_reference,
            customer_id: None,
        };
    }
    let code = resp
        .refusal_reason_code
        .or(resp.error_code)
        .unwrap_or_default();
    let message = resp.refusal_reason.or(resp.message);
    error!(operation, error_code = %code, reason = message.as_deref().unwrap_or_default(), "Adyen declined the request");
    PspOutcome::Declined {
        psp_transaction_id: resp.psp_reference,
        kind: map_provider_code(Psp::Adyen, &code),
        message,
    }
}

impl AdyenGateway {
    fn url(&self, test_mode: bool, path: &str) -> String {
        let base = if test_mode { &self.test_base_url } else { &self.base_url };
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    async fn call(
        &self,
        cfg: &PspConfig,
        test_mode: bool,
        path: &str,
        body: Value,
    ) -> Result<AdyenResponse, PspError> {
        let api_key = if test_mode {
            require(&cfg.sandbox_api_key, "Adyen sandbox api key")?
        } else {
            require(&cfg.api_key, "Adyen api key")?
        };
        let resp = self
            .client
            .post(self.url(test_mode, path))
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PspError::Configuration(format!(
                "Adyen rejected the credentials (HTTP {})",
                status.as_u16()
            )));
        }
        if status.is_server_error() {
            return Err(PspError::Transport(format!(
                "Adyen answered HTTP {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }
        let parsed: AdyenResponse = serde_json::from_str(&text).map_err(|_| {
            PspError::Transport(format!(
                "unexpected Adyen response (HTTP {}): {}",
                status.as_u16(),
                truncate(&text)
            ))
        })?;
        if !status.is_success() && parsed.error_code.is_none() {
            return Err(PspError::Transport(format!(
                "Adyen answered HTTP {} without an error code",
                status.as_u16()
            )));
        }
        Ok(parsed)
    }

    fn merchant_account(cfg: &PspConfig, test_mode: bool) -> Result<String, PspError> {
        cfg.merchant_account(test_mode)
            .map(str::to_string)
            .ok_or_else(|| PspError::Configuration("Adyen merchant account is missing".to_string()))
    }

    async fn payment(
        &self,
        operation: &str,
        request: &PspPaymentRequest,
        test_mode: bool,
        immediate_capture: bool,
    ) -> Result<PspOutcome, PspError> {
        let cfg = &request.psp_config;
        let personal = request.extra.personal_data.clone().unwrap_or_default();
        let mut body = json!({
            "amount": {
                "value": request.payment_data.amount,
                "currency": request.payment_data.currency,
            },
            "reference": request.purchase_id.clone().unwrap_or_else(|| request.alias_id.clone()),
            "merchantAccount": Self::merchant_account(cfg, test_mode)?,
            "shopperReference": request.alias_id,
            "shopperEmail": personal.email,
            "shopperIP": personal.customer_ip,
        });
        match request.extra.payment_method {
            PaymentMethod::Cc => {
                let alias = request
                    .psp_alias
                    .clone()
                    .ok_or_else(|| PspError::Configuration("Adyen card alias is missing".to_string()))?;
                body["selectedRecurringDetailReference"] = json!(alias);
                body["recurring"] = json!({"contract": "RECURRING"});
                body["shopperInteraction"] = json!("ContAuth");
            }
            PaymentMethod::Sepa if immediate_capture => {
                let sepa = request.extra.sepa_config.clone().unwrap_or_default();
                let owner = [personal.first_name.clone(), personal.last_name.clone()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                body["paymentMethod"] = json!({
                    "type": "sepadirectdebit",
                    "sepa.ownerName": owner,
                    "sepa.ibanNumber": require(&sepa.iban, "IBAN")?,
                });
            }
            other => {
                return Err(PspError::UnsupportedOperation(format!(
                    "{operation} with {} is not supported by Adyen",
                    other.as_str()
                )))
            }
        }
        if immediate_capture {
            body["captureDelayHours"] = json!(0);
        }
        info!(alias_id = %request.alias_id, operation, test_mode, "Adyen payment");
        let resp = self.call(cfg, test_mode, "/authorise", body).await?;
        Ok(outcome(operation, resp))
    }

    async fn modification(
        &self,
        operation: &str,
        path: &str,
        request: &PspCaptureRequest,
        with_amount: bool,
        test_mode: bool,
    ) -> Result<PspOutcome, PspError> {
        let cfg = &request.psp_config;
        let mut body = json!({
            "originalReference": request.psp_transaction_id,
            "reference": request.purchase_id.clone().unwrap_or_else(|| request.psp_transaction_id.clone()),
            "merchantAccount": Self::merchant_account(cfg, test_mode)?,
        });
        if with_amount {
            body["modificationAmount"] = json!({
                "value": request.amount,
                "currency": request.currency,
            });
        }
        info!(psp_transaction_id = %request.psp_transaction_id, operation, test_mode, "Adyen modification");
        let resp = self.call(cfg, test_mode, path, body).await?;
        Ok(outcome(operation, resp))
    }
}

#[async_trait::async_trait]
impl PspGateway for AdyenGateway {
    fn provider(&self) -> Psp {
        Psp::Adyen
    }

    async fn calculate_config(
        &self,
        psp_config: Option<&PspConfig>,
        _dynamic_config: &DynamicPspConfig,
        test_mode: bool,
    ) -> Result<Option<PspAliasConfig>, PspError> {
        Ok(psp_config.map(|cfg| PspAliasConfig {
            psp: Some(Psp::Adyen),
            merchant_id: cfg.merchant_account(test_mode).map(str::to_string),
            mode: Some(if test_mode { "test" } else { "live" }.to_string()),
            client_encryption_key: if test_mode {
                cfg.sandbox_client_encryption_key.clone()
            } else {
                cfg.client_encryption_key.clone()
            },
            ..Default::default()
        }))
    }

    async fn register_alias(
        &self,
        request: &PspRegisterAliasRequest,
        test_mode: bool,
    ) -> Result<Option<PspRegisterAliasResponse>, PspError> {
        let extra = request
            .extra
            .as_ref()
            .ok_or_else(|| PspError::Configuration("alias extra is missing".to_string()))?;
        match extra.payment_method {
            PaymentMethod::Sepa => return Ok(None),
            PaymentMethod::Cc => {}
            other => {
                return Err(PspError::UnsupportedOperation(format!(
                    "{} aliases are not supported by Adyen",
                    other.as_str()
                )))
            }
        }
        let cc = extra.cc_config.clone().unwrap_or_default();
        let personal = extra.personal_data.clone().unwrap_or_default();
        let cfg = &request.psp_config;
        let body = json!({
            "amount": {"value": 0, "currency": cfg.currency.clone().unwrap_or_else(|| "EUR".to_string())},
            "reference": request.alias_id,
            "merchantAccount": Self::merchant_account(cfg, test_mode)?,
            "shopperReference": request.alias_id,
            "shopperEmail": personal.email,
            "shopperIP": personal.customer_ip,
            "recurring": {"contract": "RECURRING"},
            "additionalData": {
                "encryptedCardNumber": require(&cc.encrypted_card_number, "encrypted card number")?,
                "encryptedExpiryMonth": cc.encrypted_expiry_month,
                "encryptedExpiryYear": cc.encrypted_expiry_year,
                "encryptedSecurityCode": cc.encrypted_security_code,
            },
        });
        let resp = self.call(cfg, test_mode, "/authorise", body).await?;
        if resp.refusal_reason.is_some() || resp.error_code.is_some() {
            let reason = resp.refusal_reason.or(resp.message).unwrap_or_default();
            error!(alias_id = %request.alias_id, reason = %reason, "Adyen card registration failed");
            return Err(PspError::Configuration(format!("card registration refused: {reason}")));
        }
        let detail_reference = resp
            .additional_data
            .as_ref()
            .and_then(|d| d.get("recurring.recurringDetailReference"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Some(PspRegisterAliasResponse {
            psp_alias: detail_reference.or(resp.psp_reference),
            extra: request.extra.clone(),
        }))
    }

    async fn preauthorize(&self, request: &PspPaymentRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.payment("preauthorization", request, test_mode, false).await
    }

    async fn authorize(&self, request: &PspPaymentRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.payment("authorization", request, test_mode, true).await
    }

    async fn capture(&self, request: &PspCaptureRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.modification("capture", "/capture", request, true, test_mode).await
    }

    async fn reverse(&self, request: &PspReversalRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.modification("reversal", "/cancel", request, false, test_mode).await
    }

    async fn refund(&self, request: &PspRefundRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        match request.payment_method {
            PaymentMethod::Sepa => {
                self.modification("refund", "/cancelOrRefund", request, false, test_mode)
                    .await
            }
            _ => self.modification("refund", "/refund", request, true, test_mode).await,
        }
    }

    async fn delete_alias(&self, request: &PspDeleteAliasRequest, test_mode: bool) {
        if request.payment_method != Some(PaymentMethod::Cc) {
            return;
        }
        let merchant_account = match Self::merchant_account(&request.psp_config, test_mode) {
            Ok(account) => account,
            Err(e) => {
                error!(alias_id = %request.alias_id, error = %e, "Adyen alias deletion skipped");
                return;
            }
        };
        let body = json!({
            "shopperReference": request.customer_reference.clone().unwrap_or_else(|| request.alias_id.clone()),
            "recurringDetailReference": request.psp_alias,
            "merchantAccount": merchant_account,
        });
        if let Err(e) = self.call(&request.psp_config, test_mode, "/disable", body).await {
            error!(alias_id = %request.alias_id, error = %e, "Adyen alias deletion failed");
        }
    }

    fn extract_notifications(&self, body: &[u8]) -> Result<Vec<InboundNotification>, PspError> {
        let parsed: AdyenNotificationRequest = serde_json::from_slice(body)
            .map_err(|e| PspError::Configuration(format!("invalid Adyen notification: {e}")))?;
        parsed
            .notification_items
            .into_iter()
            .map(|wrapper| {
                let item = wrapper.item;
                let field = |name: &str| {
                    item.get(name)
                        .and_then(Value::as_str)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                        .ok_or_else(|| PspError::Configuration(format!("notification item without {name}")))
                };
                Ok(InboundNotification {
                    id: NotificationId::new(field("pspReference")?, field("eventCode")?),
                    message: item.clone(),
                })
            })
            .collect()
    }

    fn parse_notification(&self, notification: &Notification) -> Result<PspNotification, PspError> {
        let message = &notification.message;
        if !message.is_object() {
            return Err(PspError::Configuration("stored Adyen notification is not an object".to_string()));
        }
        let action = event_to_action(&notification.id.psp_event);
        let amount = message.get("amount");
        Ok(PspNotification {
            psp_transaction_id: notification.id.psp_transaction_id.clone(),
            action,
            status: if message.get("success").and_then(Value::as_str) == Some("true") {
                TransactionStatus::Success
            } else {
                TransactionStatus::Fail
            },
            amount: amount.and_then(|a| a.get("value")).and_then(Value::as_i64),
            currency: amount
                .and_then(|a| a.get("currency"))
                .and_then(Value::as_str)
                .map(str::to_string),
            reason: if action == NotificationAction::Additional {
                Some(notification.id.psp_event.clone())
            } else {
                message.get("reason").and_then(Value::as_str).map(str::to_string)
            },
        })
    }
}
