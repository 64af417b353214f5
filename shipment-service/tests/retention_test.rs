mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use serde_json::Value;
use shipment_service::models::{
    Address, Booking, BookingItem, ContactInfo, DeliveryAssignment, Invoice, InvoiceRequest,
    ReviewStatus, ServiceCode,
};
use shipment_service::services::ShipmentStore;

fn contact(name: &str, city: &str, country: &str) -> ContactInfo {
    ContactInfo {
        name: name.to_string(),
        phone: "+971500000001".to_string(),
        email: None,
        address: Address {
            line1: "Unit 2".to_string(),
            line2: None,
            city: city.to_string(),
            state: None,
            postal_code: None,
            country_code: country.to_string(),
        },
    }
}

/// Booking in the given review state, backdated by `age_days`.
fn aged_booking(status: ReviewStatus, age_days: i64) -> Booking {
    let mut booking = Booking::new(
        "uae-to-ph".to_string(),
        contact("Ana Cruz", "Dubai", "AE"),
        contact("Jose Cruz", "Manila", "PH"),
        vec![BookingItem {
            commodity: "Clothes".to_string(),
            quantity: 1,
            weight_kg: Some(3.0),
            dimensions: None,
        }],
        false,
        None,
        None,
        Some("913472".to_string()),
        vec![],
    );
    let then = Utc::now() - Duration::days(age_days);
    booking.created_at = then;
    booking.updated_at = then;
    if status != ReviewStatus::NotReviewed {
        booking.review_status = status;
        booking.reviewed_at = Some(then);
        booking.reviewed_by = Some("ops.clerk".to_string());
    }
    booking
}

fn aged_request(tracking: &str, invoice: &str, age_days: i64) -> InvoiceRequest {
    let mut request = InvoiceRequest::new_draft(
        ServiceCode::UaeToPh,
        "Ana Cruz".to_string(),
        "Jose Cruz".to_string(),
        "Dubai, AE".to_string(),
        "Manila, PH".to_string(),
        false,
        None,
        tracking.to_string(),
        invoice.to_string(),
    );
    let then = Utc::now() - Duration::days(age_days);
    request.created_at = then;
    request.updated_at = then;
    request
}

fn aged_assignment(request_id: &str, age_days: i64) -> DeliveryAssignment {
    let mut assignment = DeliveryAssignment::new(
        request_id.to_string(),
        "AAA1BB2CC34DD5E".to_string(),
        "Jose Cruz".to_string(),
        "+639170000001".to_string(),
        "12 Mabini St, Manila, PH".to_string(),
        0.0,
        "AED".to_string(),
        None,
    );
    let then = Utc::now() - Duration::days(age_days);
    assignment.created_at = then;
    assignment.updated_at = then;
    assignment
}

async fn run_cleanup(app: &TestApp) -> Value {
    let response = app.post_json("/admin/cleanup", &serde_json::json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn sweep_keeps_a_day_of_safety_margin() {
    let app = TestApp::spawn().await;

    let on_window = aged_booking(ReviewStatus::Reviewed, 30);
    let beyond = aged_booking(ReviewStatus::Reviewed, 32);
    app.store.insert_booking(&on_window).await.unwrap();
    app.store.insert_booking(&beyond).await.unwrap();

    let report = run_cleanup(&app).await;
    assert_eq!(report["status"], "completed");
    assert_eq!(report["reviewed_bookings_deleted"], 1);
    assert_eq!(report["errors"], 0);

    // Thirty days is inside window plus margin and must survive.
    assert!(app
        .store
        .get_booking(&on_window.booking_id)
        .await
        .unwrap()
        .is_some());
    assert!(app
        .store
        .get_booking(&beyond.booking_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rejected_bookings_age_out_faster() {
    let app = TestApp::spawn().await;

    let rejected_old = aged_booking(ReviewStatus::Rejected, 17);
    let rejected_recent = aged_booking(ReviewStatus::Rejected, 14);
    let pending_ancient = aged_booking(ReviewStatus::NotReviewed, 60);
    app.store.insert_booking(&rejected_old).await.unwrap();
    app.store.insert_booking(&rejected_recent).await.unwrap();
    app.store.insert_booking(&pending_ancient).await.unwrap();

    let report = run_cleanup(&app).await;
    assert_eq!(report["rejected_bookings_deleted"], 1);
    assert_eq!(report["reviewed_bookings_deleted"], 0);

    assert!(app
        .store
        .get_booking(&rejected_old.booking_id)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .store
        .get_booking(&rejected_recent.booking_id)
        .await
        .unwrap()
        .is_some());
    // Unreviewed bookings are never swept, whatever their age.
    assert!(app
        .store
        .get_booking(&pending_ancient.booking_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn requests_and_assignments_age_out_but_invoices_stay() {
    let app = TestApp::spawn().await;

    let old_request = aged_request("AAA1BB2CC34DD5E", "INV-000001", 32);
    let fresh_request = aged_request("FFF1GG2HH34II5J", "INV-000002", 2);
    app.store.insert_request(&old_request).await.unwrap();
    app.store.insert_request(&fresh_request).await.unwrap();

    let old_assignment = aged_assignment(&old_request.request_id, 32);
    let fresh_assignment = aged_assignment(&fresh_request.request_id, 1);
    app.store.upsert_assignment(&old_assignment).await.unwrap();
    app.store.upsert_assignment(&fresh_assignment).await.unwrap();

    let invoice = Invoice::new(
        "INV-000001".to_string(),
        old_request.request_id.clone(),
        old_request.tracking_code.clone(),
        120.0,
        "AED".to_string(),
    );
    app.store.insert_invoice(&invoice).await.unwrap();

    let report = run_cleanup(&app).await;
    assert_eq!(report["invoice_requests_deleted"], 1);
    assert_eq!(report["delivery_assignments_deleted"], 1);
    assert_eq!(report["otp_values_deleted"], 0);
    assert_eq!(report["errors"], 0);

    assert!(app
        .store
        .get_request(&old_request.request_id)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .store
        .get_request(&fresh_request.request_id)
        .await
        .unwrap()
        .is_some());
    assert!(app
        .store
        .get_assignment_for_request(&fresh_request.request_id)
        .await
        .unwrap()
        .is_some());
    // Invoice records are permanent.
    assert_eq!(app.store.count_invoices().await.unwrap(), 1);
}

#[tokio::test]
async fn cleanup_on_an_empty_store_reports_zeroes() {
    let app = TestApp::spawn().await;

    let report = run_cleanup(&app).await;
    assert_eq!(report["status"], "completed");
    assert_eq!(report["reviewed_bookings_deleted"], 0);
    assert_eq!(report["rejected_bookings_deleted"], 0);
    assert_eq!(report["invoice_requests_deleted"], 0);
    assert_eq!(report["delivery_assignments_deleted"], 0);
    assert_eq!(report["errors"], 0);
    assert!(report["started_at"].is_string());
    assert!(report["finished_at"].is_string());

    // Back-to-back manual runs are fine once the previous pass finished.
    let report = run_cleanup(&app).await;
    assert_eq!(report["status"], "completed");
}
