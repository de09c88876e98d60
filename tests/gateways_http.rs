use chrono::Utc;
use payment_orchestrator::domain::alias::{AliasExtra, CcConfig};
use payment_orchestrator::domain::error::PaymentErrorKind;
use payment_orchestrator::domain::merchant::{Psp, PspConfig};
use payment_orchestrator::domain::notification::{
    Notification, NotificationAction, NotificationId, NotificationStatus,
};
use payment_orchestrator::domain::transaction::{PaymentData, PaymentMethod, TransactionAction, TransactionStatus};
use payment_orchestrator::gateways::adyen::AdyenGateway;
use payment_orchestrator::gateways::braintree::BraintreeGateway;
use payment_orchestrator::gateways::bs_payone::BsPayoneGateway;
use payment_orchestrator::gateways::{
    DynamicPspConfig, PspError, PspGateway, PspModificationRequest, PspOutcome, PspPaymentRequest,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{basic_auth, body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adyen(server: &MockServer, timeout_ms: u64) -> AdyenGateway {
    AdyenGateway {
        base_url: format!("{}/live", server.uri()),
        test_base_url: format!("{}/test", server.uri()),
        timeout_ms,
        client: reqwest::Client::new(),
    }
}

fn payment_request(psp: Psp, method: PaymentMethod, psp_config: PspConfig) -> PspPaymentRequest {
    PspPaymentRequest {
        alias_id: "alias-1".to_string(),
        psp_alias: Some("stored-card".to_string()),
        extra: AliasExtra {
            cc_config: Some(CcConfig::default()),
            ..AliasExtra::new(method)
        },
        payment_data: PaymentData {
            amount: 300,
            currency: "EUR".to_string(),
            reason: None,
        },
        purchase_id: Some("order-7".to_string()),
        customer_id: None,
        psp_config: PspConfig {
            psp: Some(psp),
            ..psp_config
        },
    }
}

fn modification(psp_config: PspConfig, amount: i64) -> PspModificationRequest {
    PspModificationRequest {
        psp_transaction_id: "psp-tx-1".to_string(),
        amount,
        currency: "EUR".to_string(),
        purchase_id: Some("order-7".to_string()),
        payment_method: PaymentMethod::Cc,
        original_action: TransactionAction::Auth,
        reason: None,
        psp_config,
    }
}

fn adyen_config() -> PspConfig {
    PspConfig {
        merchant_id: Some("LiveAccount".to_string()),
        sandbox_merchant_id: Some("TestAccount".to_string()),
        api_key: Some("live-key".to_string()),
        sandbox_api_key: Some("test-key".to_string()),
        ..Default::default()
    }
}

fn stored(psp: Psp, txid: &str, event: &str, message: serde_json::Value) -> Notification {
    Notification {
        id: NotificationId::new(txid, event),
        status: NotificationStatus::Created,
        psp,
        message,
        attempts: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn adyen_authorization_uses_sandbox_credentials_in_test_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/test/authorise"))
        .and(header("X-API-Key", "test-key"))
        .and(body_partial_json(json!({
            "merchantAccount": "TestAccount",
            "selectedRecurringDetailReference": "stored-card",
            "captureDelayHours": 0,
            "amount": {"value": 300, "currency": "EUR"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pspReference": "8515",
            "resultCode": "Authorised"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = adyen(&server, 2_000)
        .authorize(&payment_request(Psp::Adyen, PaymentMethod::Cc, adyen_config()), true)
        .await
        .unwrap();
    assert_eq!(outcome, PspOutcome::approved("8515"));
}

#[tokio::test]
async fn adyen_refusal_is_a_normalized_decline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/live/authorise"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pspReference": "8516",
            "resultCode": "Refused",
            "refusalReason": "Refused",
            "refusalReasonCode": "2"
        })))
        .mount(&server)
        .await;

    let outcome = adyen(&server, 2_000)
        .preauthorize(&payment_request(Psp::Adyen, PaymentMethod::Cc, adyen_config()), false)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PspOutcome::Declined {
            psp_transaction_id: Some("8516".to_string()),
            kind: PaymentErrorKind::PaymentError,
            message: Some("Refused".to_string()),
        }
    );
}

#[tokio::test]
async fn adyen_http_failures_are_not_declines() {
    let server = MockServer::start().await;
    Mock::given(path("/live/capture"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    Mock::given(path("/live/cancel"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(path("/live/refund"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let gateway = adyen(&server, 100);
    let capture = gateway.capture(&modification(adyen_config(), 300), false).await;
    assert!(matches!(capture, Err(PspError::Transport(_))));
    let reverse = gateway.reverse(&modification(adyen_config(), 300), false).await;
    assert!(matches!(reverse, Err(PspError::Configuration(_))));
    let refund = gateway.refund(&modification(adyen_config(), 100), false).await;
    assert!(matches!(refund, Err(PspError::Transport(ref m)) if m == "psp timeout"));
}

#[tokio::test]
async fn adyen_notifications_parse_into_the_common_model() {
    let gateway = AdyenGateway {
        base_url: String::new(),
        test_base_url: String::new(),
        timeout_ms: 1_000,
        client: reqwest::Client::new(),
    };
    let body = json!({
        "live": "false",
        "notificationItems": [{
            "NotificationRequestItem": {
                "pspReference": "8515",
                "eventCode": "CANCELLATION",
                "success": "true",
                "amount": {"value": 300, "currency": "EUR"}
            }
        }]
    });
    let inbound = gateway
        .extract_notifications(body.to_string().as_bytes())
        .unwrap();
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].id, NotificationId::new("8515", "CANCELLATION"));

    let parsed = gateway
        .parse_notification(&stored(Psp::Adyen, "8515", "CANCELLATION", inbound[0].message.clone()))
        .unwrap();
    assert_eq!(parsed.action, NotificationAction::Reversal);
    assert_eq!(parsed.status, TransactionStatus::Success);
    assert_eq!(parsed.amount, Some(300));
    assert_eq!(parsed.currency.as_deref(), Some("EUR"));
}

fn payone(server: &MockServer) -> BsPayoneGateway {
    BsPayoneGateway {
        base_url: format!("{}/post-gateway/", server.uri()),
        api_version: "3.11".to_string(),
        encoding: "UTF-8".to_string(),
        timeout_ms: 2_000,
        client: reqwest::Client::new(),
    }
}

fn payone_config() -> PspConfig {
    PspConfig {
        merchant_id: Some("42865".to_string()),
        portal_id: Some("2030968".to_string()),
        key: Some("portal-secret".to_string()),
        account_id: Some("42949".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn payone_preauthorization_posts_a_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/post-gateway/"))
        .and(body_string_contains("request=preauthorization"))
        .and(body_string_contains("clearingtype=cc"))
        .and(body_string_contains("pseudocardpan=stored-card"))
        .and(body_string_contains("mode=test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("status=APPROVED\ntxid=310\nuserid=77\n"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = payone(&server)
        .preauthorize(&payment_request(Psp::BsPayone, PaymentMethod::Cc, payone_config()), true)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PspOutcome::Approved {
            psp_transaction_id: Some("310".to_string()),
            customer_id: Some("77".to_string()),
        }
    );
}

#[tokio::test]
async fn payone_refund_error_maps_to_refund_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("request=refund"))
        .and(body_string_contains("amount=-100"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("status=ERROR\nerrorcode=917\nerrormessage=Limit exceeded\n"),
        )
        .mount(&server)
        .await;

    let outcome = payone(&server)
        .refund(&modification(payone_config(), 100), false)
        .await
        .unwrap();
    match outcome {
        PspOutcome::Declined { kind, message, .. } => {
            assert_eq!(kind, PaymentErrorKind::RefundError);
            assert_eq!(message.as_deref(), Some("Limit exceeded"));
        }
        other => panic!("expected a decline, got {other:?}"),
    }
}

#[tokio::test]
async fn payone_client_config_carries_a_hash_but_no_key() {
    let server = MockServer::start().await;
    let config = payone(&server)
        .calculate_config(Some(&payone_config()), &DynamicPspConfig::default(), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.hash.as_deref().map(str::len), Some(96));
    assert_eq!(config.mode.as_deref(), Some("test"));
    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("portal-secret"));
}

#[tokio::test]
async fn payone_transaction_status_is_keyed_by_sequence() {
    let server = MockServer::start().await;
    let gateway = payone(&server);
    let body = "key=abc&txid=310&txaction=capture&sequencenumber=2&price=3.00&currency=EUR";
    let inbound = gateway.extract_notifications(body.as_bytes()).unwrap();
    assert_eq!(inbound[0].id, NotificationId::new("310", "capture_2"));
    assert!(inbound[0].message.get("key").is_none());

    let parsed = gateway
        .parse_notification(&stored(Psp::BsPayone, "310", "capture_2", inbound[0].message.clone()))
        .unwrap();
    assert_eq!(parsed.action, NotificationAction::Capture);
    assert_eq!(parsed.amount, Some(300));
}

fn braintree(server: &MockServer) -> BraintreeGateway {
    BraintreeGateway {
        base_url: format!("{}/production", server.uri()),
        sandbox_base_url: format!("{}/sandbox", server.uri()),
        timeout_ms: 2_000,
        client: reqwest::Client::new(),
    }
}

fn braintree_config() -> PspConfig {
    PspConfig {
        merchant_id: Some("bt-live".to_string()),
        sandbox_merchant_id: Some("bt-sandbox".to_string()),
        public_key: Some("pub".to_string()),
        private_key: Some("priv".to_string()),
        sandbox_public_key: Some("sandbox-pub".to_string()),
        sandbox_private_key: Some("sandbox-priv".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn braintree_capture_submits_for_settlement() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/sandbox/merchants/bt-sandbox/transactions/psp-tx-1/submit_for_settlement"))
        .and(basic_auth("sandbox-pub", "sandbox-priv"))
        .and(body_partial_json(json!({"amount": "2.50"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "transaction": {"id": "psp-tx-1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = braintree(&server)
        .capture(&modification(braintree_config(), 250), true)
        .await
        .unwrap();
    assert_eq!(outcome, PspOutcome::approved("psp-tx-1"));
}

#[tokio::test]
async fn braintree_processor_decline_uses_the_response_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/production/merchants/bt-live/transactions"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "success": false,
            "transaction": {
                "id": "bt-9",
                "processorResponseCode": "2001",
                "processorResponseText": "Insufficient Funds"
            }
        })))
        .mount(&server)
        .await;

    let outcome = braintree(&server)
        .authorize(&payment_request(Psp::Braintree, PaymentMethod::Cc, braintree_config()), false)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PspOutcome::Declined {
            psp_transaction_id: Some("bt-9".to_string()),
            kind: PaymentErrorKind::PaymentError,
            message: Some("Insufficient Funds".to_string()),
        }
    );
}

#[tokio::test]
async fn braintree_rejects_sepa_without_calling_out() {
    let server = MockServer::start().await;
    let err = braintree(&server)
        .authorize(&payment_request(Psp::Braintree, PaymentMethod::Sepa, braintree_config()), false)
        .await
        .unwrap_err();
    assert!(matches!(err, PspError::UnsupportedOperation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
