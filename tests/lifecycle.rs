mod common;

use common::{harness, payment, BARE_ALIAS, CC_ALIAS, FOREIGN_ALIAS, MERCHANT, OTHER_MERCHANT, SEPA_ALIAS};
use payment_orchestrator::domain::error::ApiErrorCode;
use payment_orchestrator::domain::transaction::{
    CaptureRequest, RefundRequest, ReversalRequest, TransactionAction, TransactionStatus,
};
use payment_orchestrator::gateways::mock::MockGateway;
use payment_orchestrator::repo::store::AliasStore;
use std::time::Duration;

fn refund(amount: i64) -> RefundRequest {
    RefundRequest {
        amount,
        currency: None,
        reason: Some("returned goods".to_string()),
    }
}

#[tokio::test]
async fn capture_defaults_to_the_preauthorized_amount_and_happens_once() {
    let h = harness(MockGateway::approving()).await;
    let preauth = h
        .orchestrator
        .preauthorize(MERCHANT, Some("P1"), false, &payment(CC_ALIAS, 500))
        .await
        .unwrap();
    let id = preauth.value.transaction_id.clone();

    let capture = h
        .orchestrator
        .capture(MERCHANT, &id, None, false, &CaptureRequest::default())
        .await
        .unwrap();
    assert!(capture.created);
    assert_eq!(capture.value.transaction_id, id);
    assert_eq!(capture.value.action, TransactionAction::Capture);
    assert_eq!(capture.value.amount, 500);

    let again = h
        .orchestrator
        .capture(MERCHANT, &id, Some("another-key"), false, &CaptureRequest::default())
        .await
        .unwrap();
    assert!(!again.created);
    assert_eq!(again.value, capture.value);
    assert_eq!(h.gateway.calls(), 2);
}

#[tokio::test]
async fn capture_amount_must_fit_the_preauthorization() {
    let h = harness(MockGateway::approving()).await;
    let id = h
        .orchestrator
        .preauthorize(MERCHANT, Some("P2"), false, &payment(CC_ALIAS, 500))
        .await
        .unwrap()
        .value
        .transaction_id;

    for amount in [0, 501] {
        let err = h
            .orchestrator
            .capture(MERCHANT, &id, None, false, &CaptureRequest { amount: Some(amount) })
            .await
            .unwrap_err();
        assert_eq!(err.code, ApiErrorCode::ValidationError);
    }

    let partial = h
        .orchestrator
        .capture(MERCHANT, &id, None, false, &CaptureRequest { amount: Some(200) })
        .await
        .unwrap();
    assert_eq!(partial.value.amount, 200);
}

#[tokio::test]
async fn reversal_and_capture_exclude_each_other() {
    let h = harness(MockGateway::approving()).await;

    let captured = h
        .orchestrator
        .preauthorize(MERCHANT, Some("P3"), false, &payment(CC_ALIAS, 100))
        .await
        .unwrap()
        .value
        .transaction_id;
    h.orchestrator
        .capture(MERCHANT, &captured, None, false, &CaptureRequest::default())
        .await
        .unwrap();
    let err = h
        .orchestrator
        .reverse(MERCHANT, &captured, None, false, &ReversalRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::TransactionNotAllowed);

    let reversed = h
        .orchestrator
        .preauthorize(MERCHANT, Some("P4"), false, &payment(CC_ALIAS, 100))
        .await
        .unwrap()
        .value
        .transaction_id;
    let reversal = h
        .orchestrator
        .reverse(MERCHANT, &reversed, None, false, &ReversalRequest::default())
        .await
        .unwrap();
    assert_eq!(reversal.value.action, TransactionAction::Reversal);
    let second = h
        .orchestrator
        .reverse(MERCHANT, &reversed, Some("other"), false, &ReversalRequest::default())
        .await
        .unwrap();
    assert!(!second.created);
    let err = h
        .orchestrator
        .capture(MERCHANT, &reversed, None, false, &CaptureRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::TransactionNotAllowed);
}

#[tokio::test]
async fn refunds_never_exceed_the_authorized_amount() {
    let h = harness(MockGateway::approving()).await;
    let id = h
        .orchestrator
        .authorize(MERCHANT, Some("A1"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap()
        .value
        .transaction_id;

    let first = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R1"), false, &refund(100))
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.value.action, TransactionAction::Refund);
    h.orchestrator
        .refund(MERCHANT, &id, Some("R2"), false, &refund(200))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R3"), false, &refund(1))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::IncorrectRefundValue);

    let replay = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R1"), false, &refund(100))
        .await
        .unwrap();
    assert!(!replay.created);

    let zero = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R4"), false, &refund(0))
        .await
        .unwrap_err();
    assert_eq!(zero.code, ApiErrorCode::IncorrectRefundValue);
}

#[tokio::test]
async fn oversized_refund_cannot_overflow_the_cumulative_check() {
    let h = harness(MockGateway::approving()).await;
    let id = h
        .orchestrator
        .authorize(MERCHANT, Some("A1"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap()
        .value
        .transaction_id;
    h.orchestrator
        .refund(MERCHANT, &id, Some("R1"), false, &refund(100))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R2"), false, &refund(i64::MAX))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::IncorrectRefundValue);
    assert_eq!(h.gateway.calls(), 2);
}

#[tokio::test]
async fn follow_ups_resolve_the_alias_only_when_the_provider_is_called() {
    let h = harness(MockGateway::approving()).await;
    let id = h
        .orchestrator
        .preauthorize(MERCHANT, Some("P1"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap()
        .value
        .transaction_id;
    let captured = h
        .orchestrator
        .capture(MERCHANT, &id, None, false, &CaptureRequest::default())
        .await
        .unwrap();
    assert!(h.aliases.deactivate(CC_ALIAS).await.unwrap());

    let replay = h
        .orchestrator
        .capture(MERCHANT, &id, None, false, &CaptureRequest::default())
        .await
        .unwrap();
    assert!(!replay.created);
    assert_eq!(replay.value, captured.value);

    let err = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R1"), false, &refund(100))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::AliasNotFound);
    assert_eq!(h.gateway.calls(), 2);
}

#[tokio::test]
async fn concurrent_refunds_respect_the_cumulative_limit() {
    let h = harness(MockGateway::approving().with_delay(Duration::from_millis(10))).await;
    let id = h
        .orchestrator
        .authorize(MERCHANT, Some("A2"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap()
        .value
        .transaction_id;

    let mut handles = Vec::new();
    for i in 0..5 {
        let orchestrator = h.orchestrator.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("R-{i}");
            orchestrator
                .refund(MERCHANT, &id, Some(&key), false, &refund(100))
                .await
        }));
    }

    let mut refunded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(executed) if executed.value.status == TransactionStatus::Success => refunded += 1,
            Err(e) if e.code == ApiErrorCode::IncorrectRefundValue => rejected += 1,
            other => panic!("unexpected refund result: {other:?}"),
        }
    }
    assert_eq!((refunded, rejected), (3, 2));
}

#[tokio::test]
async fn refund_requires_a_settled_transaction() {
    let h = harness(MockGateway::approving()).await;
    let id = h
        .orchestrator
        .preauthorize(MERCHANT, Some("P5"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap()
        .value
        .transaction_id;

    let err = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R1"), false, &refund(100))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::TransactionNotAllowed);

    h.orchestrator
        .capture(MERCHANT, &id, None, false, &CaptureRequest { amount: Some(150) })
        .await
        .unwrap();
    let err = h
        .orchestrator
        .refund(MERCHANT, &id, Some("R2"), false, &refund(200))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::IncorrectRefundValue);
    assert!(h
        .orchestrator
        .refund(MERCHANT, &id, Some("R3"), false, &refund(150))
        .await
        .is_ok());
}

#[tokio::test]
async fn follow_ups_check_ownership_and_test_mode() {
    let h = harness(MockGateway::approving()).await;
    let id = h
        .orchestrator
        .preauthorize(MERCHANT, Some("P6"), true, &payment(CC_ALIAS, 300))
        .await
        .unwrap()
        .value
        .transaction_id;

    let err = h
        .orchestrator
        .capture(MERCHANT, &id, None, false, &CaptureRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::PspTestModeInconsistent);

    let err = h
        .orchestrator
        .capture(OTHER_MERCHANT, &id, None, true, &CaptureRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::WrongAliasMerchantMapping);

    let err = h
        .orchestrator
        .capture(MERCHANT, "does-not-exist", None, true, &CaptureRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::TransactionNotFound);
}

#[tokio::test]
async fn alias_and_merchant_problems_are_client_errors() {
    let h = harness(MockGateway::approving()).await;
    let cases = [
        ("ghost", CC_ALIAS, ApiErrorCode::MerchantNotFound),
        (MERCHANT, "missing-alias", ApiErrorCode::AliasNotFound),
        (MERCHANT, FOREIGN_ALIAS, ApiErrorCode::WrongAliasMerchantMapping),
        (MERCHANT, BARE_ALIAS, ApiErrorCode::IncompleteAlias),
    ];
    for (merchant, alias, code) in cases {
        let err = h
            .orchestrator
            .authorize(merchant, Some("K"), false, &payment(alias, 300))
            .await
            .unwrap_err();
        assert_eq!(err.code, code, "merchant {merchant} alias {alias}");
        assert!(err.code.is_client_error());
    }
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn sepa_cannot_be_preauthorized() {
    let h = harness(MockGateway::approving()).await;
    let err = h
        .orchestrator
        .preauthorize(MERCHANT, Some("S1"), false, &payment(SEPA_ALIAS, 300))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::SepaNotAllowed);

    let auth = h
        .orchestrator
        .authorize(MERCHANT, Some("S1"), false, &payment(SEPA_ALIAS, 300))
        .await
        .unwrap();
    assert_eq!(auth.value.status, TransactionStatus::Success);
}
