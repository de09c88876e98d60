use crate::domain::alias::PayPalConfig;
use crate::domain::merchant::{Psp, PspConfig};
use crate::domain::transaction::PaymentMethod;
use crate::gateways::error_codes::map_provider_code;
use crate::gateways::{
    require, truncate, DynamicPspConfig, PspAliasConfig, PspCaptureRequest, PspDeleteAliasRequest,
    PspError, PspGateway, PspOutcome, PspPaymentRequest, PspRefundRequest, PspRegisterAliasRequest,
    PspRegisterAliasResponse, PspReversalRequest,
};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

pub struct BraintreeGateway {
    pub base_url: String,
    pub sandbox_base_url: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BraintreeTransaction {
    id: Option<String>,
    processor_response_code: Option<String>,
    processor_response_text: Option<String>,
    gateway_rejection_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BraintreeValidationError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BraintreeResult {
    #[serde(default)]
    success: bool,
    transaction: Option<BraintreeTransaction>,
    #[serde(default)]
    errors: Vec<BraintreeValidationError>,
    message: Option<String>,
    token: Option<String>,
    billing_agreement_id: Option<String>,
    client_token: Option<String>,
}

/// Braintree expects decimal major units.
pub fn minor_to_decimal(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn outcome(operation: &str, result: BraintreeResult) -> PspOutcome {
    let tx = result.transaction.unwrap_or_default();
    if result.success {
        return PspOutcome::Approved {
            psp_transaction_id: tx.id,
            customer_id: None,
        };
    }
    let validation = result.errors.into_iter().next();
    let code = tx
        .gateway_rejection_reason
        .clone()
        .or_else(|| tx.processor_response_code.clone())
        .or_else(|| validation.as_ref().and_then(|e| e.code.clone()))
        .unwrap_or_default();
    let message = tx
        .processor_response_text
        .or_else(|| validation.and_then(|e| e.message))
        .or(result.message);
    error!(operation, error_code = %code, "Braintree declined the request");
    PspOutcome::Declined {
        psp_transaction_id: tx.id,
        kind: map_provider_code(Psp::Braintree, &code),
        message,
    }
}

impl BraintreeGateway {
    async fn call(
        &self,
        cfg: &PspConfig,
        test_mode: bool,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<BraintreeResult, PspError> {
        let (public_key, private_key) = cfg
            .key_pair_for(test_mode)
            .ok_or_else(|| PspError::Configuration("Braintree key pair is missing".to_string()))?;
        let merchant_id = cfg
            .merchant_account(test_mode)
            .ok_or_else(|| PspError::Configuration("Braintree merchant id is missing".to_string()))?;
        let base = if test_mode { &self.sandbox_base_url } else { &self.base_url };
        let url = format!("{}/merchants/{}{}", base.trim_end_matches('/'), merchant_id, path);

        let mut builder = self
            .client
            .request(method, url)
            .basic_auth(public_key, Some(private_key))
            .timeout(std::time::Duration::from_millis(self.timeout_ms));
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PspError::Configuration(format!(
                "Braintree rejected the credentials (HTTP {})",
                status.as_u16()
            )));
        }
        if status.is_server_error() || status == StatusCode::NOT_FOUND {
            return Err(PspError::Transport(format!(
                "Braintree answered HTTP {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }
        if text.trim().is_empty() {
            return Ok(BraintreeResult {
                success: status.is_success(),
                ..Default::default()
            });
        }
        serde_json::from_str(&text).map_err(|_| {
            PspError::Transport(format!(
                "unexpected Braintree response (HTTP {}): {}",
                status.as_u16(),
                truncate(&text)
            ))
        })
    }

    fn device_data(request: &PspPaymentRequest) -> Option<String> {
        match request.extra.payment_method {
            PaymentMethod::PayPal => request
                .extra
                .pay_pal_config
                .as_ref()
                .and_then(|c| c.device_data.clone()),
            _ => request.extra.cc_config.as_ref().and_then(|c| c.device_data.clone()),
        }
    }

    async fn sale(
        &self,
        operation: &str,
        request: &PspPaymentRequest,
        test_mode: bool,
        submit_for_settlement: bool,
    ) -> Result<PspOutcome, PspError> {
        if request.extra.payment_method == PaymentMethod::Sepa {
            return Err(PspError::UnsupportedOperation(
                "SEPA is not supported by Braintree".to_string(),
            ));
        }
        let token = require(&request.psp_alias, "Braintree payment method token")?;
        let body = json!({
            "amount": minor_to_decimal(request.payment_data.amount),
            "currencyIsoCode": request.payment_data.currency,
            "paymentMethodToken": token,
            "deviceData": Self::device_data(request),
            "orderId": request.purchase_id,
            "options": {"submitForSettlement": submit_for_settlement},
        });
        info!(alias_id = %request.alias_id, operation, test_mode, "Braintree sale");
        let result = self
            .call(&request.psp_config, test_mode, Method::POST, "/transactions", Some(body))
            .await?;
        Ok(outcome(operation, result))
    }
}

fn nonce_and_device(
    method: PaymentMethod,
    cc_nonce: Option<String>,
    cc_device: Option<String>,
    pay_pal: Option<&PayPalConfig>,
) -> Result<(String, Option<String>), PspError> {
    let (nonce, device) = match method {
        PaymentMethod::PayPal => {
            let cfg = pay_pal.ok_or_else(|| PspError::Configuration("PayPal config is missing".to_string()))?;
            (cfg.nonce.clone(), cfg.device_data.clone())
        }
        _ => (cc_nonce, cc_device),
    };
    let nonce = nonce
        .filter(|n| !n.is_empty())
        .ok_or_else(|| PspError::Configuration("payment method nonce is missing".to_string()))?;
    Ok((nonce, device))
}

#[async_trait::async_trait]
impl PspGateway for BraintreeGateway {
    fn provider(&self) -> Psp {
        Psp::Braintree
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
        let result = self
            .call(cfg, test_mode, Method::POST, "/client_token", Some(json!({})))
            .await?;
        let client_token = result
            .client_token
            .ok_or_else(|| PspError::Transport("Braintree returned no client token".to_string()))?;
        Ok(Some(PspAliasConfig {
            psp: Some(Psp::Braintree),
            mode: Some(if test_mode { "sandbox" } else { "production" }.to_string()),
            client_token: Some(client_token),
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
            PaymentMethod::Cc | PaymentMethod::PayPal => {}
            other => {
                return Err(PspError::UnsupportedOperation(format!(
                    "{} registration is not supported by Braintree",
                    other.as_str()
                )))
            }
        }
        let cc = extra.cc_config.clone().unwrap_or_default();
        let (nonce, device_data) =
            nonce_and_device(extra.payment_method, cc.nonce, cc.device_data, extra.pay_pal_config.as_ref())?;
        info!(alias_id = %request.alias_id, test_mode, "registering Braintree payment method");
        let body = json!({
            "customerId": request.alias_id,
            "paymentMethodNonce": nonce,
            "deviceData": device_data,
        });
        let result = self
            .call(&request.psp_config, test_mode, Method::POST, "/payment_methods", Some(body))
            .await?;
        if !result.success {
            let message = result
                .errors
                .into_iter()
                .next()
                .and_then(|e| e.message)
                .or(result.message)
                .unwrap_or_default();
            return Err(PspError::Configuration(format!(
                "Braintree payment method registration failed: {message}"
            )));
        }
        let mut enriched = extra.clone();
        if extra.payment_method == PaymentMethod::PayPal {
            let mut pay_pal = extra.pay_pal_config.clone().unwrap_or_default();
            pay_pal.billing_agreement_id = result.billing_agreement_id.clone();
            enriched.pay_pal_config = Some(pay_pal);
        }
        Ok(Some(PspRegisterAliasResponse {
            psp_alias: result.token,
            extra: Some(enriched),
        }))
    }

    async fn preauthorize(&self, request: &PspPaymentRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.sale("preauthorization", request, test_mode, false).await
    }

    async fn authorize(&self, request: &PspPaymentRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        self.sale("authorization", request, test_mode, true).await
    }

    async fn capture(&self, request: &PspCaptureRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        let path = format!("/transactions/{}/submit_for_settlement", request.psp_transaction_id);
        let body = json!({"amount": minor_to_decimal(request.amount)});
        let result = self
            .call(&request.psp_config, test_mode, Method::PUT, &path, Some(body))
            .await?;
        Ok(outcome("capture", result))
    }

    async fn reverse(&self, request: &PspReversalRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        let path = format!("/transactions/{}/void", request.psp_transaction_id);
        let result = self
            .call(&request.psp_config, test_mode, Method::PUT, &path, None)
            .await?;
        Ok(outcome("reversal", result))
    }

    async fn refund(&self, request: &PspRefundRequest, test_mode: bool) -> Result<PspOutcome, PspError> {
        let path = format!("/transactions/{}/refund", request.psp_transaction_id);
        let body = json!({"amount": minor_to_decimal(request.amount)});
        let result = self
            .call(&request.psp_config, test_mode, Method::POST, &path, Some(body))
            .await?;
        Ok(outcome("refund", result))
    }

    async fn delete_alias(&self, request: &PspDeleteAliasRequest, test_mode: bool) {
        let Some(token) = request.psp_alias.as_deref() else {
            return;
        };
        let path = format!("/payment_methods/{token}");
        match self
            .call(&request.psp_config, test_mode, Method::DELETE, &path, None)
            .await
        {
            Ok(result) if !result.success => {
                error!(alias_id = %request.alias_id, "Braintree refused payment method deletion")
            }
            Ok(_) => {}
            Err(e) => error!(alias_id = %request.alias_id, error = %e, "Braintree alias deletion failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minor_units_as_decimal() {
        assert_eq!(minor_to_decimal(1234), "12.34");
        assert_eq!(minor_to_decimal(5), "0.05");
        assert_eq!(minor_to_decimal(-300), "-3.00");
    }

    #[test]
    fn pay_pal_registration_requires_nonce() {
        let err = nonce_and_device(
            PaymentMethod::PayPal,
            Some("cc-nonce".to_string()),
            None,
            Some(&PayPalConfig::default()),
        )
        .unwrap_err();
        assert!(matches!(err, PspError::Configuration(_)));
    }

    #[test]
    fn processor_decline_maps_through_the_range() {
        let result = BraintreeResult {
            success: false,
            transaction: Some(BraintreeTransaction {
                id: Some("bt1".to_string()),
                processor_response_code: Some("2001".to_string()),
                processor_response_text: Some("Insufficient Funds".to_string()),
                gateway_rejection_reason: None,
            }),
            ..Default::default()
        };
        match outcome("authorization", result) {
            PspOutcome::Declined { kind, psp_transaction_id, .. } => {
                assert_eq!(kind, crate::domain::error::PaymentErrorKind::PaymentError);
                assert_eq!(psp_transaction_id.as_deref(), Some("bt1"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
