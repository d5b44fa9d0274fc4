mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use harmony_backend::{
    models::payment_record::{PaymentRecord, PaymentStatus},
    store::{PaymentStore, ReceiptLedger},
};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{json_request, get_request, send, signed_webhook, spawn_app, spawn_app_with, test_config, FakeGateway, TestApp};

async fn checkout(app: &TestApp, donation_type: &str) -> Value {
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/donations/checkout",
            &json!({
                "donor_name": "Grace Hopper",
                "email": "grace@example.com",
                "phone": "+15555550100",
                "amount": "75.00",
                "donation_type": donation_type,
                "designation": "music-education",
                "message": "Keep playing"
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {}", body);
    body
}

async fn record(app: &TestApp, id: Uuid) -> PaymentRecord {
    PaymentStore::get(&*app.store, id).await.unwrap().unwrap()
}

fn record_id(body: &Value) -> Uuid {
    body["record_id"].as_str().unwrap().parse().unwrap()
}

fn event(id: &str, event_type: &str, object: Value) -> Value {
    json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": { "object": object }
    })
}

fn session_completed(event_id: &str, record_id: Uuid, intent: &str) -> Value {
    event(
        event_id,
        "checkout.session.completed",
        json!({
            "id": "cs_test_1",
            "object": "checkout.session",
            "metadata": { "recordId": record_id.to_string() },
            "payment_intent": intent,
            "subscription": null,
            "payment_status": "paid"
        }),
    )
}

#[tokio::test]
async fn checkout_session_completed_marks_record_completed() {
    let app = spawn_app();
    let body = checkout(&app, "one-time").await;
    let id = record_id(&body);
    assert_eq!(body["session_id"], "cs_test_1");
    assert_eq!(record(&app, id).await.status, PaymentStatus::Pending);

    let (status, ack) = send(&app.router, signed_webhook(&session_completed("evt_1", id, "pi_live_1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "received": true }));

    let stored = record(&app, id).await;
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert_eq!(stored.external_transaction_ref.as_deref(), Some("pi_live_1"));
    assert_eq!(app.payment_notifier.donor_email_count(), 1);
    assert_eq!(app.payment_notifier.admin_email_count(), 1);

    let trail = app.store.audit_trail(id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, "status:pending->completed");
    assert_eq!(trail[0].changes.as_ref().unwrap()["event_id"], "evt_1");
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged_without_mutation() {
    let app = spawn_app();
    let id = record_id(&checkout(&app, "one-time").await);
    let before = record(&app, id).await;

    let payload = event("evt_unknown", "payout.paid", json!({ "id": "po_1" }));
    let (status, ack) = send(&app.router, signed_webhook(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);

    let after = record(&app, id).await;
    assert_eq!(after.status, before.status);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(app.store.audit_trail(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_mutation() {
    let app = spawn_app();
    let id = record_id(&checkout(&app, "one-time").await);
    let payload = session_completed("evt_forged", id, "pi_forged").to_string();

    let forged = Request::builder()
        .method("POST")
        .uri("/api/donations/webhook")
        .header("content-type", "application/json")
        .header(
            "stripe-signature",
            format!("t={},v1={}", chrono::Utc::now().timestamp(), "00".repeat(32)),
        )
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, body) = send(&app.router, forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Webhook Error"));

    let unsigned = Request::builder()
        .method("POST")
        .uri("/api/donations/webhook")
        .header("content-type", "application/json")
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = send(&app.router, unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stored = record(&app, id).await;
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(app.payment_notifier.donor_email_count(), 0);
}

#[tokio::test]
async fn signed_but_malformed_body_is_bad_request() {
    let app = spawn_app();
    let (status, _) = send(&app.router, signed_webhook(&json!({ "hello": "world" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeated_payment_succeeded_sends_no_duplicate_notification() {
    let app = spawn_app();
    let id = record_id(&checkout(&app, "one-time").await);

    send(&app.router, signed_webhook(&session_completed("evt_c", id, "pi_test_1"))).await;
    assert_eq!(app.payment_notifier.donor_email_count(), 1);

    let succeeded = event(
        "evt_pi",
        "payment_intent.succeeded",
        json!({ "id": "pi_test_1", "object": "payment_intent", "amount": 7500, "status": "succeeded" }),
    );
    for _ in 0..2 {
        let (status, ack) = send(&app.router, signed_webhook(&succeeded)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["received"], true);
    }

    assert_eq!(record(&app, id).await.status, PaymentStatus::Completed);
    assert_eq!(app.payment_notifier.donor_email_count(), 1);
    assert_eq!(app.store.audit_trail(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn late_expired_event_does_not_cancel_completed_record() {
    let app = spawn_app();
    let id = record_id(&checkout(&app, "one-time").await);

    let succeeded = event(
        "evt_ok",
        "payment_intent.succeeded",
        json!({ "id": "pi_test_1", "object": "payment_intent" }),
    );
    send(&app.router, signed_webhook(&succeeded)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Completed);

    let expired = event(
        "evt_late",
        "checkout.session.expired",
        json!({ "id": "cs_test_1", "metadata": { "record_id": id.to_string() } }),
    );
    let (status, _) = send(&app.router, signed_webhook(&expired)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record(&app, id).await.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn expired_session_cancels_pending_record() {
    let app = spawn_app();
    let id = record_id(&checkout(&app, "one-time").await);
    let expired = event(
        "evt_exp",
        "checkout.session.expired",
        json!({ "id": "cs_test_1", "metadata": { "donationId": id.to_string() } }),
    );
    send(&app.router, signed_webhook(&expired)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn refund_and_failure_follow_guards() {
    let app = spawn_app();
    let id = record_id(&checkout(&app, "one-time").await);

    let failed = event(
        "evt_fail",
        "payment_intent.payment_failed",
        json!({ "id": "pi_test_1", "last_payment_error": { "message": "card declined" } }),
    );
    send(&app.router, signed_webhook(&failed)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Failed);

    // A refund can't apply to a failed payment.
    let refunded = event(
        "evt_refund",
        "charge.refunded",
        json!({ "id": "ch_1", "payment_intent": "pi_test_1", "amount_refunded": 7500 }),
    );
    send(&app.router, signed_webhook(&refunded)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Failed);

    send(&app.router, signed_webhook(&session_completed("evt_retry", id, "pi_test_1"))).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Completed);

    send(&app.router, signed_webhook(&refunded)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Refunded);

    let actions: Vec<String> = app
        .store
        .audit_trail(id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            "status:pending->failed",
            "status:failed->completed",
            "status:completed->refunded"
        ]
    );
}

#[tokio::test]
async fn subscription_lifecycle_uses_subscription_reference() {
    let app = spawn_app();
    let body = checkout(&app, "monthly").await;
    let id = record_id(&body);
    assert_eq!(record(&app, id).await.external_transaction_ref.as_deref(), Some("sub_test_1"));

    let active = event(
        "evt_sub_active",
        "customer.subscription.updated",
        json!({ "id": "sub_test_1", "status": "active", "customer": "cus_1" }),
    );
    send(&app.router, signed_webhook(&active)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Completed);

    let past_due = event(
        "evt_sub_past_due",
        "customer.subscription.updated",
        json!({ "id": "sub_test_1", "status": "past_due" }),
    );
    send(&app.router, signed_webhook(&past_due)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Completed);

    let deleted = event(
        "evt_sub_deleted",
        "customer.subscription.deleted",
        json!({ "id": "sub_test_1", "status": "canceled" }),
    );
    send(&app.router, signed_webhook(&deleted)).await;
    assert_eq!(record(&app, id).await.status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn event_for_unknown_record_is_acknowledged() {
    let app = spawn_app();
    let (status, ack) = send(
        &app.router,
        signed_webhook(&session_completed("evt_orphan", Uuid::new_v4(), "pi_orphan")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);

    let dispute = event(
        "evt_dispute",
        "charge.dispute.created",
        json!({ "id": "dp_1", "payment_intent": "pi_orphan", "reason": "fraudulent" }),
    );
    let (status, _) = send(&app.router, signed_webhook(&dispute)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn receipts_increase_without_gaps() {
    let app = spawn_app();
    let mut sequences = Vec::new();
    for _ in 0..5 {
        let body = checkout(&app, "one-time").await;
        let receipt = body["receipt_number"].as_str().unwrap().to_string();
        assert!(receipt.starts_with("H4A-"));
        sequences.push(receipt.rsplit('-').next().unwrap().parse::<u64>().unwrap());
    }
    assert_eq!(sequences, vec![44210, 44211, 44212, 44213, 44214]);
    assert!(app.store.receipt_exists(&format!(
        "H4A-{}-44214",
        chrono::Utc::now()
            .with_timezone(&chrono_tz::America::New_York)
            .format("%Y%m%d")
    ))
    .await
    .unwrap());
}

#[tokio::test]
async fn checkout_validation_and_status_lookup() {
    let app = spawn_app();
    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/donations/checkout",
            &json!({
                "donor_name": "",
                "email": "not-an-email",
                "amount": "0",
                "donation_type": "one-time"
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = record_id(&checkout(&app, "yearly").await);
    let (status, body) = send(&app.router, get_request(&format!("/api/donations/{}/status", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["donation_type"], "yearly");

    let (status, _) = send(
        &app.router,
        get_request(&format!("/api/donations/{}/status", Uuid::new_v4()), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gateway_failure_returns_bad_gateway() {
    let app = spawn_app_with(
        test_config(),
        FakeGateway {
            fail: true,
            ..FakeGateway::default()
        },
    );
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/donations/checkout",
            &json!({
                "donor_name": "Grace",
                "email": "grace@example.com",
                "amount": "20.00",
                "donation_type": "one-time"
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}
