mod common;

use common::{harness, payment, CC_ALIAS, MERCHANT};
use payment_orchestrator::domain::error::ApiErrorCode;
use payment_orchestrator::domain::transaction::TransactionStatus;
use payment_orchestrator::gateways::mock::{MockBehavior, MockGateway};
use std::time::Duration;

#[tokio::test]
async fn replay_returns_stored_result_without_calling_the_psp() {
    let h = harness(MockGateway::new(MockBehavior::Approve(Some("abc123".to_string())))).await;

    let first = h
        .orchestrator
        .authorize(MERCHANT, Some("K1"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.value.psp_transaction_id.as_deref(), Some("abc123"));
    assert_eq!(first.value.amount, 300);
    assert_eq!(first.value.currency, "EUR");
    assert_eq!(first.value.status, TransactionStatus::Success);

    let replay = h
        .orchestrator
        .authorize(MERCHANT, Some("K1"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap();
    assert!(!replay.created);
    assert_eq!(replay.value, first.value);
    assert_eq!(h.gateway.calls(), 1);

    let violation = h
        .orchestrator
        .authorize(MERCHANT, Some("K1"), false, &payment(CC_ALIAS, 400))
        .await
        .unwrap_err();
    assert_eq!(violation.code, ApiErrorCode::IdempotencyViolation);
    assert_eq!(h.gateway.calls(), 1);
    assert_eq!(h.transactions.all().len(), 1);
}

#[tokio::test]
async fn same_key_for_another_action_is_independent() {
    let h = harness(MockGateway::approving()).await;

    let auth = h
        .orchestrator
        .authorize(MERCHANT, Some("K2"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap();
    let preauth = h
        .orchestrator
        .preauthorize(MERCHANT, Some("K2"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap();
    assert!(auth.created && preauth.created);
    assert_ne!(auth.value.transaction_id, preauth.value.transaction_id);
    assert_eq!(h.gateway.calls(), 2);
}

#[tokio::test]
async fn concurrent_requests_with_one_key_dispatch_once() {
    let h = harness(MockGateway::approving().with_delay(Duration::from_millis(30))).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let request = payment(CC_ALIAS, 300);
            orchestrator
                .authorize(MERCHANT, Some("K-concurrent"), false, &request)
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(h.gateway.calls(), 1);
    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
    let id = &results[0].value.transaction_id;
    assert!(results.iter().all(|r| &r.value.transaction_id == id));
    assert_eq!(h.transactions.all().len(), 1);
}

#[tokio::test]
async fn payments_require_an_idempotency_key() {
    let h = harness(MockGateway::approving()).await;

    for key in [None, Some(""), Some("   ")] {
        let err = h
            .orchestrator
            .preauthorize(MERCHANT, key, false, &payment(CC_ALIAS, 300))
            .await
            .unwrap_err();
        assert_eq!(err.code, ApiErrorCode::MissingIdempotencyKey);
    }
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn declines_are_stored_and_replayed() {
    let h = harness(MockGateway::from_setting("ALWAYS_FAILURE")).await;

    let first = h
        .orchestrator
        .authorize(MERCHANT, Some("K-decline"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.value.status, TransactionStatus::Fail);
    assert_eq!(first.value.error.map(|k| k.as_str()), Some("PAYMENT_ERROR"));
    assert_eq!(first.value.error_message.as_deref(), Some("mock decline"));

    let replay = h
        .orchestrator
        .authorize(MERCHANT, Some("K-decline"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap();
    assert!(!replay.created);
    assert_eq!(replay.value.transaction_id, first.value.transaction_id);
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test]
async fn transport_failures_leave_the_key_reusable() {
    let h = harness(MockGateway::new(MockBehavior::Timeout)).await;

    let err = h
        .orchestrator
        .authorize(MERCHANT, Some("K-timeout"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::PspModuleError);
    assert!(h.transactions.all().is_empty());

    let again = h
        .orchestrator
        .authorize(MERCHANT, Some("K-timeout"), false, &payment(CC_ALIAS, 300))
        .await
        .unwrap_err();
    assert_eq!(again.code, ApiErrorCode::PspModuleError);
    assert_eq!(h.gateway.calls(), 2);
}
