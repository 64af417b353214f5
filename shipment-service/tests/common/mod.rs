//! Shared test harness. Spawns the service on a random port against the
//! in-memory store and a recording carrier double, and keeps handles to
//! both so tests can assert on what the handlers persisted.

use std::sync::Arc;
use std::time::Duration;

use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use shipment_service::config::{
    CacheConfig, CarrierConfig, FinanceConfig, RetentionConfig, ShipmentConfig, StoreBackend,
    StoreConfig,
};
use shipment_service::services::carrier::StatusUpdate;
use shipment_service::services::{init_metrics, CarrierApi, MemoryStore, MockCarrier, ShipmentStore};
use shipment_service::startup::Application;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub carrier: Arc<MockCarrier>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        init_metrics();

        let config = ShipmentConfig {
            common: CoreConfig {
                port: 0,
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                mongodb_uri: None,
                mongodb_database: "shipment_test".to_string(),
            },
            carrier: CarrierConfig {
                enabled: true,
                base_url: "http://empost.test.invalid".to_string(),
                api_key: Secret::new("test-key".to_string()),
                timeout_secs: 2,
            },
            finance: FinanceConfig {
                currency: "AED".to_string(),
                payment_base_url: "https://pay.test.invalid/collect".to_string(),
            },
            retention: RetentionConfig {
                // The first scheduled sweep sits one full interval out, so
                // the background worker never fires during a test run.
                interval_secs: 21_600,
            },
            cache: CacheConfig { ttl_secs: 30 },
        };

        let store = Arc::new(MemoryStore::new());
        let carrier = Arc::new(MockCarrier::new(true));

        let app = Application::build_with_store(
            config,
            store.clone() as Arc<dyn ShipmentStore>,
            carrier.clone() as Arc<dyn CarrierApi>,
        )
        .await
        .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Self {
            address,
            port,
            client,
            store,
            carrier,
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a booking and approve it, returning the invoice request the
    /// conversion produced.
    pub async fn approved_request(&self, booking: &Value) -> Value {
        let response = self.post_json("/bookings", booking).await;
        assert_eq!(response.status().as_u16(), 201, "booking intake failed");
        let created: Value = response.json().await.expect("booking body");
        let booking_id = created["id"].as_str().expect("booking id");

        let response = self
            .post_json(
                &format!("/bookings/{}/review", booking_id),
                &json!({"decision": "reviewed", "reviewed_by": "ops.clerk"}),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200, "review failed");
        let outcome: Value = response.json().await.expect("review body");
        let request = outcome["invoice_request"].clone();
        assert!(request.is_object(), "approval produced no invoice request");
        request
    }

    /// Poll until the carrier-assigned uhawb lands on the request. The
    /// create call runs on a background task, so it settles shortly after
    /// the verification response.
    pub async fn wait_for_carrier_ref(&self, request_id: &str) -> String {
        for _ in 0..50 {
            let response = self.get(&format!("/invoice-requests/{}", request_id)).await;
            let body: Value = response.json().await.expect("request body");
            if let Some(uhawb) = body["empost_uhawb"].as_str() {
                return uhawb.to_string();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("carrier reference never landed on request {}", request_id);
    }

    /// Poll until a status push with the given status reaches the carrier
    /// double.
    pub async fn wait_for_status_push(&self, status: &str) -> StatusUpdate {
        for _ in 0..50 {
            if let Some(update) = self
                .carrier
                .pushed_statuses()
                .into_iter()
                .find(|update| update.status == status)
            {
                return update;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("status {} was never pushed to the carrier", status);
    }
}

/// Baseline booking payload on the given route.
pub fn booking_payload(service: &str, commodity: &str) -> Value {
    json!({
        "service": service,
        "sender": {
            "name": "Ana Cruz",
            "phone": "+971500000001",
            "address": {
                "line1": "Villa 4, Al Barsha",
                "city": "Dubai",
                "country_code": "AE"
            }
        },
        "receiver": {
            "name": "Jose Cruz",
            "phone": "+639170000001",
            "address": {
                "line1": "12 Mabini St",
                "city": "Manila",
                "country_code": "PH"
            }
        },
        "items": [
            {"commodity": commodity, "quantity": 2, "weight_kg": 5.0}
        ]
    })
}

/// Verification form that passes the UAE to PH rules for an uninsured
/// shipment.
pub fn verification_payload() -> Value {
    json!({
        "actual_weight": 10.0,
        "volumetric_weight": 8.0,
        "chargeable_weight": 0,
        "total_kg": 10.0,
        "number_of_boxes": 2,
        "shipment_classification": "FLOWMIC"
    })
}
