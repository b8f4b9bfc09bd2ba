//! Payment notification webhook tests.

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use chatgate_core::PaymentStatus;
use chatgate_service::crypto::{hmac_sha256_hex, SIGNATURE_HEADER};
use chatgate_service::ServiceConfig;
use chatgate_store::{AccountStore, PaymentStore};
use common::{t0, test_config, TestHarness, USER};
use serde_json::{json, Value};

const SECRET: &str = "whsec_test";

fn notification(event: &str, id: &str, status: &str) -> Value {
    json!({
        "type": "notification",
        "event": event,
        "object": { "id": id, "status": status, "paid": status == "succeeded" }
    })
}

#[tokio::test]
async fn redelivered_success_activates_once() {
    let harness = TestHarness::live();
    let payment = harness
        .engine
        .state
        .ledger
        .create(USER, "premium_month")
        .await
        .unwrap();
    let body = notification("payment.succeeded", "ext-1", "succeeded");

    let first: Value = harness.server.post("/webhooks/yookassa").json(&body).await.json();
    let second: Value = harness.server.post("/webhooks/yookassa").json(&body).await.json();

    assert_eq!(first["received"], true);
    assert_eq!(first["outcome"]["outcome"], "activated");
    assert_eq!(second["outcome"]["outcome"], "already_settled");

    let stored = harness
        .engine
        .store
        .find_by_local_id(payment.local_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Succeeded);

    let status = harness.engine.store.get_status(USER, t0()).unwrap();
    assert!(status.is_premium());
    assert_eq!(status.days_left, 30);
    assert_eq!(harness.engine.messenger.count_containing("Payment received"), 1);
}

#[tokio::test]
async fn unknown_payment_is_acknowledged() {
    let harness = TestHarness::live();

    let response = harness
        .server
        .post("/webhooks/yookassa")
        .json(&notification("payment.succeeded", "nobody-knows", "succeeded"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["outcome"]["outcome"], "unknown_payment");
    assert!(harness.engine.messenger.sent().is_empty());
}

#[tokio::test]
async fn success_event_without_succeeded_status_is_ignored() {
    let harness = TestHarness::live();
    let payment = harness
        .engine
        .state
        .ledger
        .create(USER, "premium_month")
        .await
        .unwrap();

    let body: Value = harness
        .server
        .post("/webhooks/yookassa")
        .json(&notification("payment.succeeded", "ext-1", "pending"))
        .await
        .json();

    assert_eq!(body["outcome"]["outcome"], "acknowledged");
    let stored = harness
        .engine
        .store
        .find_by_local_id(payment.local_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn cancellation_closes_the_payment() {
    let harness = TestHarness::live();
    let payment = harness
        .engine
        .state
        .ledger
        .create(USER, "premium_month")
        .await
        .unwrap();

    let body: Value = harness
        .server
        .post("/webhooks/yookassa")
        .json(&notification("payment.canceled", "ext-1", "canceled"))
        .await
        .json();

    assert_eq!(body["outcome"]["outcome"], "closed");
    assert_eq!(body["outcome"]["status"], "canceled");

    let stored = harness
        .engine
        .store
        .find_by_local_id(payment.local_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Canceled);
    assert!(!harness.engine.store.get_status(USER, t0()).unwrap().is_premium());

    // A late success cannot revive a canceled payment
    let late: Value = harness
        .server
        .post("/webhooks/yookassa")
        .json(&notification("payment.succeeded", "ext-1", "succeeded"))
        .await
        .json();
    assert_eq!(late["outcome"]["outcome"], "closed");
    assert!(!harness.engine.store.get_status(USER, t0()).unwrap().is_premium());
}

#[tokio::test]
async fn waiting_for_capture_is_recorded() {
    let harness = TestHarness::live();
    let payment = harness
        .engine
        .state
        .ledger
        .create(USER, "premium_month")
        .await
        .unwrap();

    harness
        .server
        .post("/webhooks/yookassa")
        .json(&notification("payment.waiting_for_capture", "ext-1", "waiting_for_capture"))
        .await
        .assert_status_ok();

    let stored = harness
        .engine
        .store
        .find_by_local_id(payment.local_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::WaitingConfirmation);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/webhooks/yookassa")
        .text("{not json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Signatures
// ============================================================================

fn signed_harness() -> TestHarness {
    TestHarness::with_config(ServiceConfig {
        webhook_secret: Some(SECRET.into()),
        ..test_config()
    })
}

#[tokio::test]
async fn unsigned_notification_is_rejected_when_secret_configured() {
    let harness = signed_harness();

    let response = harness
        .server
        .post("/webhooks/yookassa")
        .json(&notification("payment.succeeded", "ext-1", "succeeded"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "Invalid webhook signature");
}

#[tokio::test]
async fn wrong_signature_is_rejected() {
    let harness = signed_harness();

    let response = harness
        .server
        .post("/webhooks/yookassa")
        .add_header(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_static("sha256=deadbeef"),
        )
        .json(&notification("payment.succeeded", "ext-1", "succeeded"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn valid_signature_is_accepted() {
    let harness = signed_harness();
    let body = notification("payment.succeeded", "ext-1", "succeeded").to_string();
    let signature = format!("sha256={}", hmac_sha256_hex(SECRET, body.as_bytes()).unwrap());

    let response = harness
        .server
        .post("/webhooks/yookassa")
        .add_header(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_str(&signature).unwrap(),
        )
        .text(body)
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["outcome"]["outcome"], "unknown_payment");
}
