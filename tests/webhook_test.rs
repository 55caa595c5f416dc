mod common;

use axum::http::StatusCode;
use orderflow_api::payments::encode_order_reference;
use serde_json::json;
use uuid::Uuid;

use common::TestApp;

async fn stage_checkout(app: &TestApp) -> String {
    let (status, body) = app
        .post(
            "/checkout",
            json!({
                "customer_email": "jamie@example.com",
                "items": [{
                    "product_id": Uuid::new_v4(),
                    "name": "Desk Lamp",
                    "quantity": 2,
                    "unit_price": "34.00"
                }],
                "shipping_info": {
                    "recipient": "Jamie Park",
                    "line1": "12 Harbor Way",
                    "city": "Busan",
                    "province": "Busan",
                    "country_code": "KR",
                    "postal_code": "48060"
                },
                "total_amount": "68.00"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    body["temp_order_id"].as_str().unwrap().to_string()
}

async fn create_direct_order(app: &TestApp) -> String {
    let customer_id = Uuid::new_v4();
    let (_, address) = app
        .post(
            &format!("/customers/{customer_id}/addresses"),
            json!({
                "recipient": "Jamie Park",
                "line1": "12 Harbor Way",
                "city": "Busan",
                "province": "Busan",
                "country_code": "KR",
                "postal_code": "48060"
            }),
        )
        .await;
    app.post(
        &format!("/customers/{customer_id}/cart/items"),
        json!({
            "product_id": Uuid::new_v4(),
            "name": "Keyboard",
            "quantity": 1,
            "unit_price": "45.00"
        }),
    )
    .await;
    let (status, order) = app
        .post(
            "/orders",
            json!({
                "customer_id": customer_id,
                "shipping_address_id": address["id"]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    order["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn success_webhook_promotes_once() {
    let app = TestApp::spawn().await;
    let reference = stage_checkout(&app).await;
    let opaque = encode_order_reference(&reference);

    let payload = json!({"event": "payment.succeeded", "order_id": opaque, "payment_id": "pay_1"});
    let (status, body) = app.post("/webhooks/payment", payload.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "confirmed");
    let order_id = body["order_id"].as_str().unwrap().to_string();

    // The promoted order is real and paid.
    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["payment_status"], "completed");
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    // The snapshot is consumed.
    assert!(app
        .state
        .services
        .staged_orders
        .get_staged(&reference)
        .await
        .unwrap()
        .is_none());

    // A duplicate delivery is acknowledged without a second order.
    let (status, body) = app.post("/webhooks/payment", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("already processed or expired"));

    let (_, orders) = app.get("/orders").await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn failure_webhook_abandons_the_snapshot() {
    let app = TestApp::spawn().await;
    let reference = stage_checkout(&app).await;
    let opaque = encode_order_reference(&reference);

    let payload = json!({"event": "payment.failed", "order_id": opaque, "reason": "card declined"});
    let (status, body) = app.post("/webhooks/payment", payload.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "staged checkout abandoned");

    // No order was ever created.
    let (_, orders) = app.get("/orders").await;
    assert!(orders.as_array().unwrap().is_empty());

    // Retries are quiet no-ops.
    let (status, body) = app.post("/webhooks/payment", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "already processed or expired");
}

#[tokio::test]
async fn failure_after_success_cannot_uncreate_the_order() {
    let app = TestApp::spawn().await;
    let reference = stage_checkout(&app).await;
    let opaque = encode_order_reference(&reference);

    let (status, _) = app
        .post(
            "/webhooks/payment/success",
            json!({"order_id": opaque, "payment_id": "pay_1"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/webhooks/payment/failure",
            json!({"order_id": opaque, "reason": "late decline"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "already processed or expired");

    let (_, orders) = app.get("/orders").await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["payment_status"], "completed");
}

#[tokio::test]
async fn status_webhook_updates_a_real_order() {
    let app = TestApp::spawn().await;
    let order_id = create_direct_order(&app).await;
    let opaque = encode_order_reference(&order_id);

    let (status, body) = app
        .post(
            "/webhooks/payment",
            json!({"status": "completed", "order_id": opaque, "payment_id": "pay_9"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "confirmed");
    assert_eq!(order["order"]["payment_status"], "completed");
}

#[tokio::test]
async fn failed_status_cancels_the_order() {
    let app = TestApp::spawn().await;
    let order_id = create_direct_order(&app).await;
    let opaque = encode_order_reference(&order_id);

    let (status, _) = app
        .post(
            "/webhooks/payment",
            json!({"status": "failed", "order_id": opaque}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "cancelled");
    assert_eq!(order["order"]["payment_status"], "failed");
}

#[tokio::test]
async fn stale_webhook_cannot_move_a_terminal_order() {
    let app = TestApp::spawn().await;
    let order_id = create_direct_order(&app).await;
    let opaque = encode_order_reference(&order_id);

    let (status, _) = app
        .put(
            &format!("/orders/{order_id}/status"),
            json!({"status": "delivered"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // A late "failed" callback is acknowledged but changes nothing.
    let (status, _) = app
        .post(
            "/webhooks/payment",
            json!({"status": "failed", "order_id": opaque}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "delivered");

    // The raw value still lands in the audit trail.
    let (_, events) = app.get(&format!("/orders/{order_id}/events")).await;
    assert!(events
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["raw_gateway_status"] == "failed"));
}

#[tokio::test]
async fn unknown_gateway_status_is_audited_not_applied() {
    let app = TestApp::spawn().await;
    let order_id = create_direct_order(&app).await;
    let opaque = encode_order_reference(&order_id);

    let (status, _) = app
        .post(
            "/webhooks/payment",
            json!({"status": "requires_action", "order_id": opaque}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The order did not move.
    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "pending");
    assert_eq!(order["order"]["payment_status"], "pending");

    // But the raw value landed in the audit trail.
    let (_, events) = app.get(&format!("/orders/{order_id}/events")).await;
    let events = events.as_array().unwrap();
    assert!(events
        .iter()
        .any(|e| e["raw_gateway_status"] == "requires_action"));
}

#[tokio::test]
async fn malformed_references_and_payloads_are_client_errors() {
    let app = TestApp::spawn().await;

    // Undecodable reference.
    let (status, _) = app
        .post(
            "/webhooks/payment",
            json!({"status": "completed", "order_id": "not-an-encoded-ref"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Missing order_id.
    let (status, _) = app
        .post("/webhooks/payment", json!({"status": "completed"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unrecognized shape.
    let (status, _) = app
        .post("/webhooks/payment", json!({"hello": "world"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Status form naming an order that does not exist.
    let opaque = encode_order_reference(&Uuid::new_v4().to_string());
    let (status, _) = app
        .post(
            "/webhooks/payment",
            json!({"status": "completed", "order_id": opaque}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signed_webhooks_require_a_valid_signature() {
    let secret = "whsec_test";
    let app = TestApp::spawn_with_secret(secret).await;
    let reference = stage_checkout(&app).await;
    let opaque = encode_order_reference(&reference);
    let payload = json!({"event": "payment.succeeded", "order_id": opaque});

    // Unsigned delivery is refused.
    let (status, _) = app.post("/webhooks/payment", payload.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Wrong secret is refused.
    let (status, _) = app
        .post_signed("/webhooks/payment", "wrong", payload.clone())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A valid signature goes through.
    let (status, body) = app.post_signed("/webhooks/payment", secret, payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
