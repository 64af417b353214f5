//! EMPOST carrier API client.
//!
//! Covers the two calls the lifecycle engine makes: shipment creation at
//! first verification and best-effort status pushes on every status change.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CarrierConfig;
use crate::models::InvoiceRequest;

/// HS code sent for every line item; EMPOST requires the field but the
/// service does not capture tariff data.
const HS_CODE_PLACEHOLDER: &str = "000000";
/// EMPOST rejects zero weights, so anything below this floor is bumped.
const MIN_WEIGHT_KG: f64 = 0.1;

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("Carrier integration is not enabled")]
    NotEnabled,

    #[error("Carrier connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Carrier rejected the request: {0}")]
    Rejected(String),
}

/// One party on the shipment (sender or receiver).
#[derive(Debug, Clone, Serialize)]
pub struct PartyPayload {
    pub name: String,
    pub phone: String,
    pub address: String,
    /// ISO 3166-1 alpha-2.
    pub country_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChargePayload {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemPayload {
    pub description: String,
    pub quantity: u32,
    pub hs_code: String,
}

/// Request to register a shipment with EMPOST.
#[derive(Debug, Clone, Serialize)]
pub struct CreateShipmentRequest {
    pub awb_number: String,
    pub sender: PartyPayload,
    pub receiver: PartyPayload,
    /// Chargeable weight, floored at [`MIN_WEIGHT_KG`].
    pub weight_kg: f64,
    pub delivery_charge: ChargePayload,
    /// ISO-8601 date.
    pub pickup_date: String,
    /// "DOM" when sender and receiver countries match, else "INT".
    pub shipping_type: String,
    pub items: Vec<ItemPayload>,
}

#[derive(Debug, Deserialize)]
pub struct CreateShipmentResponse {
    /// Carrier-assigned unified house AWB.
    pub uhawb: String,
}

#[derive(Debug, Deserialize)]
struct EmpostErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Status update pushed to the carrier on any status or delivery-status
/// change.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub tracking_code: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[async_trait]
pub trait CarrierApi: Send + Sync {
    /// Register the shipment and return the carrier-assigned uhawb.
    async fn create_shipment(&self, request: &InvoiceRequest) -> Result<String, CarrierError>;
    async fn push_status(&self, update: &StatusUpdate) -> Result<(), CarrierError>;
    fn is_enabled(&self) -> bool;
}

#[derive(Clone)]
pub struct EmpostClient {
    client: Client,
    config: CarrierConfig,
    currency: String,
}

impl EmpostClient {
    pub fn new(config: CarrierConfig, currency: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            config,
            currency,
        }
    }
}

fn party_from_strings(name: &str, location: &str) -> PartyPayload {
    // "Dubai, AE" style origin/destination strings; the trailing token is
    // the country code.
    let country_code = location
        .rsplit(',')
        .next()
        .map(|code| code.trim().to_uppercase())
        .unwrap_or_default();
    PartyPayload {
        name: name.to_string(),
        phone: String::new(),
        address: location.to_string(),
        country_code,
    }
}

/// Assemble the creation payload from the invoice request. Prefers the
/// embedded booking snapshot for full contact blocks and falls back to the
/// denormalized name/location strings for walk-in drafts.
pub fn build_create_payload(request: &InvoiceRequest, currency: &str) -> CreateShipmentRequest {
    let (sender, receiver) = match &request.booking_snapshot {
        Some(snapshot) => (
            PartyPayload {
                name: snapshot.sender.name.clone(),
                phone: snapshot.sender.phone.clone(),
                address: snapshot.sender.address.formatted(),
                country_code: snapshot.sender.address.country_code.to_uppercase(),
            },
            PartyPayload {
                name: snapshot.receiver.name.clone(),
                phone: snapshot.receiver.phone.clone(),
                address: snapshot.receiver.address.formatted(),
                country_code: snapshot.receiver.address.country_code.to_uppercase(),
            },
        ),
        None => (
            party_from_strings(&request.customer_name, &request.origin),
            party_from_strings(&request.receiver_name, &request.destination),
        ),
    };

    let weight_kg = request
        .verification
        .as_ref()
        .map(|v| v.chargeable_weight)
        .unwrap_or(0.0)
        .max(MIN_WEIGHT_KG);

    let charge_amount = request
        .invoice_amount
        .or(request.declared_amount)
        .unwrap_or(0.0);

    let shipping_type = if !sender.country_code.is_empty()
        && sender.country_code == receiver.country_code
    {
        "DOM"
    } else {
        "INT"
    };

    let items = match &request.booking_snapshot {
        Some(snapshot) if !snapshot.items.is_empty() => vec![ItemPayload {
            description: snapshot.items[0].commodity.clone(),
            quantity: snapshot.items.iter().map(|item| item.quantity).sum(),
            hs_code: HS_CODE_PLACEHOLDER.to_string(),
        }],
        _ => vec![ItemPayload {
            description: "Shipment".to_string(),
            quantity: 1,
            hs_code: HS_CODE_PLACEHOLDER.to_string(),
        }],
    };

    CreateShipmentRequest {
        awb_number: request.tracking_code.clone(),
        sender,
        receiver,
        weight_kg,
        delivery_charge: ChargePayload {
            amount: charge_amount,
            currency: currency.to_string(),
        },
        pickup_date: Utc::now().format("%Y-%m-%d").to_string(),
        shipping_type: shipping_type.to_string(),
        items,
    }
}

impl EmpostClient {
    fn reject_from_body(body: &str) -> CarrierError {
        let parsed: EmpostErrorBody =
            serde_json::from_str(body).unwrap_or(EmpostErrorBody {
                message: None,
                error: None,
            });
        let detail = parsed
            .message
            .or(parsed.error)
            .unwrap_or_else(|| body.to_string());
        CarrierError::Rejected(detail)
    }
}

#[async_trait]
impl CarrierApi for EmpostClient {
    async fn create_shipment(&self, request: &InvoiceRequest) -> Result<String, CarrierError> {
        if !self.is_enabled() {
            return Err(CarrierError::NotEnabled);
        }

        let payload = build_create_payload(request, &self.currency);
        let url = format!("{}/shipments", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, body = %body, "EMPOST create_shipment response");

        if status.is_success() {
            let created: CreateShipmentResponse = serde_json::from_str(&body)
                .map_err(|e| CarrierError::Rejected(format!("unparseable response: {e}")))?;
            tracing::info!(
                tracking_code = %payload.awb_number,
                uhawb = %created.uhawb,
                "EMPOST shipment created"
            );
            Ok(created.uhawb)
        } else {
            let error = Self::reject_from_body(&body);
            tracing::error!(
                tracking_code = %payload.awb_number,
                status = %status,
                error = %error,
                "EMPOST shipment creation failed"
            );
            Err(error)
        }
    }

    async fn push_status(&self, update: &StatusUpdate) -> Result<(), CarrierError> {
        if !self.is_enabled() {
            return Err(CarrierError::NotEnabled);
        }

        let url = format!(
            "{}/shipments/{}/status",
            self.config.base_url, update.tracking_code
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(update)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, body = %body, "EMPOST push_status response");

        if status.is_success() {
            tracing::info!(
                tracking_code = %update.tracking_code,
                new_status = %update.status,
                "EMPOST status pushed"
            );
            Ok(())
        } else {
            Err(Self::reject_from_body(&body))
        }
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.base_url.is_empty()
    }
}

/// Mock carrier for testing
pub struct MockCarrier {
    enabled: bool,
    fail: AtomicBool,
    create_count: AtomicU64,
    created: Mutex<Vec<String>>,
    status_updates: Mutex<Vec<StatusUpdate>>,
}

impl MockCarrier {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fail: AtomicBool::new(false),
            create_count: AtomicU64::new(0),
            created: Mutex::new(Vec::new()),
            status_updates: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent call fail with a rejection.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> u64 {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn created_tracking_codes(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn pushed_statuses(&self) -> Vec<StatusUpdate> {
        self.status_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CarrierApi for MockCarrier {
    async fn create_shipment(&self, request: &InvoiceRequest) -> Result<String, CarrierError> {
        if !self.enabled {
            return Err(CarrierError::NotEnabled);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CarrierError::Rejected("mock failure".to_string()));
        }

        let count = self.create_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.created
            .lock()
            .unwrap()
            .push(request.tracking_code.clone());

        tracing::info!(
            tracking_code = %request.tracking_code,
            "[MOCK] EMPOST shipment would be created"
        );

        Ok(format!("UH{count:06}"))
    }

    async fn push_status(&self, update: &StatusUpdate) -> Result<(), CarrierError> {
        if !self.enabled {
            return Err(CarrierError::NotEnabled);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CarrierError::Rejected("mock failure".to_string()));
        }

        self.status_updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
