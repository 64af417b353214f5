use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::booking::{Booking, BookingSnapshot};

/// Shipment direction. Engine APIs take this enum; free-text route strings
/// from bookings or imports are resolved once at the boundary via
/// [`ServiceCode::resolve`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCode {
    PhToUae,
    UaeToPh,
    UaeToPinas,
}

impl ServiceCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCode::PhToUae => "PH_TO_UAE",
            ServiceCode::UaeToPh => "UAE_TO_PH",
            ServiceCode::UaeToPinas => "UAE_TO_PINAS",
        }
    }

    /// Map a free-text route string ("ph-to-uae", "UAE to PH", legacy
    /// "uae-to-pinas") to a service code by case-insensitive prefix match.
    pub fn resolve(input: &str) -> Option<Self> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        if normalized.contains("pinas") {
            Some(ServiceCode::UaeToPinas)
        } else if normalized.starts_with("ph") {
            Some(ServiceCode::PhToUae)
        } else if normalized.starts_with("uae") {
            Some(ServiceCode::UaeToPh)
        } else {
            None
        }
    }

    /// Both UAE_TO_PH and the legacy UAE_TO_PINAS code describe the
    /// UAE-to-Philippines direction and share its classification rules.
    pub fn is_uae_to_ph_direction(&self) -> bool {
        matches!(self, ServiceCode::UaeToPh | ServiceCode::UaeToPinas)
    }
}

impl std::fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Submitted,
    InProgress,
    Verified,
    Completed,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Submitted => "SUBMITTED",
            InvoiceStatus::InProgress => "IN_PROGRESS",
            InvoiceStatus::Verified => "VERIFIED",
            InvoiceStatus::Completed => "COMPLETED",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Some(InvoiceStatus::Draft),
            "SUBMITTED" => Some(InvoiceStatus::Submitted),
            "IN_PROGRESS" => Some(InvoiceStatus::InProgress),
            "VERIFIED" => Some(InvoiceStatus::Verified),
            "COMPLETED" => Some(InvoiceStatus::Completed),
            "CANCELLED" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Completed | InvoiceStatus::Cancelled)
    }

    /// Forward moves along DRAFT -> SUBMITTED -> IN_PROGRESS -> VERIFIED ->
    /// COMPLETED, where IN_PROGRESS is an optional stage, plus CANCELLED
    /// from any non-terminal state.
    pub fn can_transition(&self, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, to) {
            (_, Cancelled) => !self.is_terminal(),
            (Draft, Submitted) => true,
            (Submitted, InProgress) | (Submitted, Verified) => true,
            (InProgress, Verified) => true,
            (Verified, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::PickedUp => "PICKED_UP",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(DeliveryStatus::Pending),
            "PICKED_UP" => Some(DeliveryStatus::PickedUp),
            "IN_TRANSIT" => Some(DeliveryStatus::InTransit),
            "OUT_FOR_DELIVERY" => Some(DeliveryStatus::OutForDelivery),
            "DELIVERED" => Some(DeliveryStatus::Delivered),
            "CANCELLED" => Some(DeliveryStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentType {
    Document,
    NonDocument,
}

impl ShipmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentType::Document => "DOCUMENT",
            ShipmentType::NonDocument => "NON_DOCUMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    General,
    Flowmic,
    Commercial,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::General => "GENERAL",
            Classification::Flowmic => "FLOWMIC",
            Classification::Commercial => "COMMERCIAL",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GENERAL" => Some(Classification::General),
            "FLOWMIC" => Some(Classification::Flowmic),
            "COMMERCIAL" => Some(Classification::Commercial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightType {
    Actual,
    Volumetric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxEntry {
    pub box_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    pub classification: Classification,
}

/// Operations-entered measurements, derived and validated by the rule
/// engine before they are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub actual_weight: f64,
    pub volumetric_weight: f64,
    /// Always >= max(actual, volumetric) unless a positive override was
    /// supplied by operations.
    pub chargeable_weight: f64,
    pub weight_type: WeightType,
    pub shipment_classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_value: Option<f64>,
    pub insured: bool,
    pub total_kg: f64,
    pub number_of_boxes: u32,
    #[serde(default)]
    pub boxes: Vec<BoxEntry>,
    pub verified_at: DateTime<Utc>,
}

/// Operational record of an accepted shipment. `tracking_code` and
/// `invoice_number` are unique and immutable once assigned; the legacy
/// spellings (`awb_number`/`awb`, `invoice_id`) still appear on migrated
/// documents and are accepted on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub request_id: String,
    #[serde(alias = "invoice_id")]
    pub invoice_number: String,
    #[serde(alias = "awb_number", alias = "awb")]
    pub tracking_code: String,
    pub service_code: ServiceCode,
    pub status: InvoiceStatus,
    pub delivery_status: DeliveryStatus,
    pub shipment_type: ShipmentType,
    pub customer_name: String,
    pub receiver_name: String,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub insured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(
        default,
        alias = "booking_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub booking_snapshot: Option<BookingSnapshot>,
    /// Finance-entered invoice total, set at finance completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_amount: Option<f64>,
    /// Carrier-assigned shipment handle, set at most once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empost_uhawb: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::opt_chrono_datetime_as_bson_datetime"
    )]
    pub invoice_generated_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRequest {
    /// Build a SUBMITTED request from a reviewed booking.
    pub fn from_booking(
        booking: &Booking,
        service_code: ServiceCode,
        shipment_type: ShipmentType,
        tracking_code: String,
        invoice_number: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            request_id: uuid::Uuid::new_v4().to_string(),
            invoice_number,
            tracking_code,
            service_code,
            status: InvoiceStatus::Submitted,
            delivery_status: DeliveryStatus::Pending,
            shipment_type,
            customer_name: booking.sender.name.clone(),
            receiver_name: booking.receiver.name.clone(),
            origin: format!(
                "{}, {}",
                booking.sender.address.city, booking.sender.address.country_code
            ),
            destination: format!(
                "{}, {}",
                booking.receiver.address.city, booking.receiver.address.country_code
            ),
            insured: booking.insured,
            declared_amount: booking.declared_amount,
            verification: None,
            booking_id: Some(booking.booking_id.clone()),
            booking_snapshot: Some(booking.snapshot()),
            invoice_amount: None,
            empost_uhawb: None,
            invoice_generated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Walk-in draft created directly by staff, without a booking behind it.
    #[allow(clippy::too_many_arguments)]
    pub fn new_draft(
        service_code: ServiceCode,
        customer_name: String,
        receiver_name: String,
        origin: String,
        destination: String,
        insured: bool,
        declared_amount: Option<f64>,
        tracking_code: String,
        invoice_number: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            request_id: uuid::Uuid::new_v4().to_string(),
            invoice_number,
            tracking_code,
            service_code,
            status: InvoiceStatus::Draft,
            delivery_status: DeliveryStatus::Pending,
            shipment_type: ShipmentType::NonDocument,
            customer_name,
            receiver_name,
            origin,
            destination,
            insured,
            declared_amount,
            verification: None,
            booking_id: None,
            booking_snapshot: None,
            invoice_amount: None,
            empost_uhawb: None,
            invoice_generated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
