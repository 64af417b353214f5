mod common;

use chrono::Utc;
use common::{booking_payload, verification_payload, TestApp};
use serde_json::{json, Value};
use shipment_service::models::CollectionStatus;
use shipment_service::services::ShipmentStore;

fn draft_payload() -> Value {
    json!({
        "service": "uae-to-ph",
        "customer_name": "Ana Cruz",
        "receiver_name": "Jose Cruz",
        "origin": "Dubai, AE",
        "destination": "Manila, PH"
    })
}

async fn verified_request(app: &TestApp) -> (String, String) {
    let request = app
        .approved_request(&booking_payload("uae-to-ph", "Clothes"))
        .await;
    let request_id = request["id"].as_str().unwrap().to_string();
    let tracking_code = request["tracking_code"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            &format!("/invoice-requests/{}/verification", request_id),
            &verification_payload(),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let response = app
        .post_json(
            &format!("/invoice-requests/{}/verification/complete", request_id),
            &json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    (request_id, tracking_code)
}

#[tokio::test]
async fn walk_in_draft_is_created_with_fresh_identifiers() {
    let app = TestApp::spawn().await;

    let response = app.post_json("/invoice-requests", &draft_payload()).await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "DRAFT");
    assert_eq!(body["service_code"], "UAE_TO_PH");
    assert_eq!(body["delivery_status"], "PENDING");
    assert!(body["booking_id"].is_null());
    assert_eq!(body["tracking_code"].as_str().unwrap().len(), 15);
    assert!(body["invoice_number"].as_str().unwrap().starts_with("INV-"));

    let mut incomplete = draft_payload();
    incomplete["customer_name"] = json!("");
    let response = app.post_json("/invoice-requests", &incomplete).await;
    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn status_changes_follow_the_chain() {
    let app = TestApp::spawn().await;

    let response = app.post_json("/invoice-requests", &draft_payload()).await;
    let body: Value = response.json().await.unwrap();
    let request_id = body["id"].as_str().unwrap().to_string();
    let path = format!("/invoice-requests/{}/status", request_id);

    let response = app.patch_json(&path, &json!({"status": "SUBMITTED"})).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SUBMITTED");

    let response = app
        .patch_json(&path, &json!({"status": "IN_PROGRESS"}))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    // COMPLETED is only reachable from VERIFIED.
    let response = app.patch_json(&path, &json!({"status": "COMPLETED"})).await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app.patch_json(&path, &json!({"status": "SHIPPED"})).await;
    assert_eq!(response.status().as_u16(), 422);

    let response = app.patch_json(&path, &json!({"status": "CANCELLED"})).await;
    assert_eq!(response.status().as_u16(), 200);

    // Cancelled is terminal.
    let response = app.patch_json(&path, &json!({"status": "SUBMITTED"})).await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app
        .patch_json("/invoice-requests/missing/status", &json!({"status": "SUBMITTED"}))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn submitted_requests_can_verify_without_in_progress() {
    let app = TestApp::spawn().await;
    let request = app
        .approved_request(&booking_payload("uae-to-ph", "Clothes"))
        .await;
    let request_id = request["id"].as_str().unwrap().to_string();

    app.post_json(
        &format!("/invoice-requests/{}/verification", request_id),
        &verification_payload(),
    )
    .await;
    let response = app
        .patch_json(
            &format!("/invoice-requests/{}/status", request_id),
            &json!({"status": "VERIFIED"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "VERIFIED");
}

#[tokio::test]
async fn delivery_status_moves_freely_and_reaches_the_carrier() {
    let app = TestApp::spawn().await;
    let request = app
        .approved_request(&booking_payload("uae-to-ph", "Clothes"))
        .await;
    let request_id = request["id"].as_str().unwrap().to_string();
    let path = format!("/invoice-requests/{}/delivery-status", request_id);

    let response = app
        .patch_json(
            &path,
            &json!({
                "delivery_status": "IN_TRANSIT",
                "delivery_date": "2026-08-20",
                "notes": "loaded in Manila"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["delivery_status"], "IN_TRANSIT");

    let update = app.wait_for_status_push("IN_TRANSIT").await;
    assert_eq!(update.delivery_date.as_deref(), Some("2026-08-20"));
    assert_eq!(update.notes.as_deref(), Some("loaded in Manila"));

    // Unlike the invoice status, delivery progress may move backwards.
    let response = app
        .patch_json(&path, &json!({"delivery_status": "PENDING"}))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .patch_json(&path, &json!({"delivery_status": "TELEPORTED"}))
        .await;
    assert_eq!(response.status().as_u16(), 422);

    let response = app
        .patch_json(
            "/invoice-requests/missing/delivery-status",
            &json!({"delivery_status": "PENDING"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn finance_completion_writes_invoice_collection_and_assignment() {
    let app = TestApp::spawn().await;
    let (request_id, tracking_code) = verified_request(&app).await;

    let response = app
        .post_json(
            &format!("/invoice-requests/{}/finance-complete", request_id),
            &json!({"invoice_amount": 250.0}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["invoice_amount"], 250.0);
    assert!(body["invoice_generated_at"].is_string());

    assert_eq!(app.store.count_invoices().await.unwrap(), 1);

    let entry = app
        .store
        .get_collection_for_request(&request_id)
        .await
        .unwrap()
        .expect("collection entry");
    assert_eq!(entry.amount, 250.0);
    assert_eq!(entry.currency, "AED");
    assert_eq!(entry.status, CollectionStatus::Outstanding);

    let assignment = app
        .store
        .get_assignment_for_request(&request_id)
        .await
        .unwrap()
        .expect("delivery assignment");
    assert_eq!(assignment.tracking_code, tracking_code);
    assert_eq!(assignment.amount, 250.0);
    assert_eq!(assignment.receiver_name, "Jose Cruz");
    assert!(assignment.delivery_address.contains("Manila"));
    let qr = assignment.payment_qr.expect("payment qr");
    assert!(qr.link.contains(&tracking_code));
    assert!(!qr.qr_png_base64.is_empty());
    assert!(qr.expires_at > Utc::now());

    // Completion is single-shot.
    let response = app
        .post_json(
            &format!("/invoice-requests/{}/finance-complete", request_id),
            &json!({"invoice_amount": 99.0}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn zero_amount_completion_skips_the_collection_entry() {
    let app = TestApp::spawn().await;
    let (request_id, _) = verified_request(&app).await;

    let response = app
        .post_json(
            &format!("/invoice-requests/{}/finance-complete", request_id),
            &json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "COMPLETED");

    assert_eq!(app.store.count_invoices().await.unwrap(), 1);
    assert!(app
        .store
        .get_collection_for_request(&request_id)
        .await
        .unwrap()
        .is_none());
    // The delivery assignment goes out regardless of the amount.
    let assignment = app
        .store
        .get_assignment_for_request(&request_id)
        .await
        .unwrap()
        .expect("delivery assignment");
    assert_eq!(assignment.amount, 0.0);
}

#[tokio::test]
async fn finance_amount_accepts_spreadsheet_strings() {
    let app = TestApp::spawn().await;
    let (request_id, _) = verified_request(&app).await;
    let path = format!("/invoice-requests/{}/finance-complete", request_id);

    let response = app
        .post_json(&path, &json!({"invoice_amount": "not-a-number"}))
        .await;
    assert_eq!(response.status().as_u16(), 422);

    let response = app
        .post_json(&path, &json!({"invoice_amount": "-10"}))
        .await;
    assert_eq!(response.status().as_u16(), 422);

    let response = app
        .post_json(&path, &json!({"invoice_amount": " 120.50 "}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["invoice_amount"], 120.5);
}

#[tokio::test]
async fn finance_completion_requires_verified_status() {
    let app = TestApp::spawn().await;
    let request = app
        .approved_request(&booking_payload("uae-to-ph", "Clothes"))
        .await;
    let request_id = request["id"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            &format!("/invoice-requests/{}/finance-complete", request_id),
            &json!({"invoice_amount": 50}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn request_listing_filters_and_projects() {
    let app = TestApp::spawn().await;
    app.approved_request(&booking_payload("ph-to-uae", "Electronics"))
        .await;
    app.approved_request(&booking_payload("uae-to-ph", "Clothes"))
        .await;

    let response = app.get("/invoice-requests?status=SUBMITTED").await;
    let listing: Value = response.json().await.unwrap();
    assert_eq!(listing["total"], 2);

    let response = app.get("/invoice-requests?service_code=PH_TO_UAE").await;
    let listing: Value = response.json().await.unwrap();
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["requests"][0]["service_code"], "PH_TO_UAE");

    let response = app.get("/invoice-requests?status=COMPLETED").await;
    let listing: Value = response.json().await.unwrap();
    assert_eq!(listing["total"], 0);

    let response = app.get("/invoice-requests?fields=id,status").await;
    let listing: Value = response.json().await.unwrap();
    let item = listing["requests"][0].as_object().unwrap();
    assert_eq!(item.len(), 2);
    assert!(item.contains_key("id"));
    assert!(item.contains_key("status"));
}
