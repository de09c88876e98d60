mod common;

use common::*;
use payment_orchestrator::gateways::mock::{MockBehavior, MockGateway};
use payment_orchestrator::http::routes::router;
use payment_orchestrator::AppState;
use serde_json::{json, Value};

async fn serve(h: &Harness) -> String {
    let state = AppState {
        transactions: h.orchestrator.clone(),
        aliases: h.alias_service(),
        notifications: h.ingestor(),
        pool: None,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn preauth_body(amount: i64) -> Value {
    json!({
        "aliasId": CC_ALIAS,
        "paymentData": {"amount": amount, "currency": "EUR", "reason": "order 42"},
        "purchaseId": "purchase-1",
        "customerId": null
    })
}

#[tokio::test]
async fn preauthorization_replays_with_200_and_conflicts_with_409() {
    let h = harness(MockGateway::new(MockBehavior::Approve(Some("abc123".to_string())))).await;
    let base = serve(&h).await;
    let client = reqwest::Client::new();
    let put = |body: Value| {
        client
            .put(format!("{base}/preauthorization"))
            .header("Merchant-Id", MERCHANT)
            .header("Idempotent-Key", "k-http")
            .json(&body)
            .send()
    };

    let first = put(preauth_body(300)).await.unwrap();
    assert_eq!(first.status(), 201);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["pspTransactionId"], "abc123");
    assert_eq!(first["status"], "SUCCESS");
    assert_eq!(first["action"], "PREAUTH");

    let replay = put(preauth_body(300)).await.unwrap();
    assert_eq!(replay.status(), 200);
    let replay: Value = replay.json().await.unwrap();
    assert_eq!(replay["transactionId"], first["transactionId"]);

    let conflict = put(preauth_body(400)).await.unwrap();
    assert_eq!(conflict.status(), 409);
    let conflict: Value = conflict.json().await.unwrap();
    assert_eq!(conflict["error"]["code"], "IDEMPOTENCY_VIOLATION");
    assert_eq!(h.gateway.calls(), 1);

    let tx = first["transactionId"].as_str().unwrap();
    let capture = client
        .put(format!("{base}/preauthorization/{tx}/capture"))
        .header("Merchant-Id", MERCHANT)
        .send()
        .await
        .unwrap();
    assert_eq!(capture.status(), 201);
    let capture: Value = capture.json().await.unwrap();
    assert_eq!(capture["action"], "CAPTURE");
    assert_eq!(capture["amount"], 300);
}

#[tokio::test]
async fn missing_merchant_header_is_unauthorized() {
    let h = harness(MockGateway::approving()).await;
    let base = serve(&h).await;
    let resp = reqwest::Client::new()
        .put(format!("{base}/authorization"))
        .header("Idempotent-Key", "k")
        .json(&preauth_body(100))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
}

#[tokio::test]
async fn alias_creation_reads_psp_type_header() {
    let h = harness(MockGateway::approving()).await;
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{base}/alias"))
        .header("Merchant-Id", MERCHANT)
        .header("Idempotent-Key", "alias-k")
        .header("PSP-Type", "MOCK")
        .header("PSP-Test-Mode", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    assert_eq!(created["pspConfig"]["type"], "MOCK");
    assert_eq!(created["pspConfig"]["mode"], "test");

    let unknown = client
        .post(format!("{base}/alias"))
        .header("Merchant-Id", MERCHANT)
        .header("Idempotent-Key", "alias-k2")
        .header("PSP-Type", "STRIPE")
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 400);
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(unknown["error"]["code"], "PSP_IMPL_NOT_FOUND");
}

#[tokio::test]
async fn mock_notifications_are_acknowledged_and_stored_once() {
    let h = harness(MockGateway::approving()).await;
    let base = serve(&h).await;
    let body = json!({
        "notifications": [{
            "pspTransactionId": "mock-1",
            "event": "CAPTURE",
            "success": true,
            "amount": 300,
            "currency": "EUR",
            "reason": null
        }]
    });
    for _ in 0..2 {
        let resp = reqwest::Client::new()
            .post(format!("{base}/notification/mock"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.text().await.unwrap().contains("[accepted]"));
    }
    assert_eq!(h.notifications.all().len(), 1);

    let ready: Value = reqwest::get(format!("{base}/ops/readiness"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ready["ready"], true);
    assert_eq!(ready["providers"], json!(["MOCK"]));
}
