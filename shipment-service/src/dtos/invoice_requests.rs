use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    BookingSnapshot, DeliveryStatus, InvoiceRequest, InvoiceStatus, ServiceCode, ShipmentType,
    Verification,
};
use crate::services::rules::NumberOrText;

/// Walk-in draft entered by staff at the counter.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDraftRequest {
    #[validate(length(min = 1, message = "Service route is required"))]
    pub service: String,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(length(min = 1, message = "Receiver name is required"))]
    pub receiver_name: String,
    #[validate(length(min = 1, message = "Origin is required"))]
    pub origin: String,
    #[validate(length(min = 1, message = "Destination is required"))]
    pub destination: String,
    #[serde(default)]
    pub insured: bool,
    pub declared_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RequestListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<InvoiceStatus>,
    pub service_code: Option<ServiceCode>,
    pub fields: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FinanceCompleteRequest {
    pub invoice_amount: Option<NumberOrText>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeDeliveryStatusRequest {
    pub delivery_status: String,
    pub delivery_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceRequestResponse {
    pub id: String,
    pub invoice_number: String,
    pub tracking_code: String,
    pub service_code: ServiceCode,
    pub status: InvoiceStatus,
    pub delivery_status: DeliveryStatus,
    pub shipment_type: ShipmentType,
    pub customer_name: String,
    pub receiver_name: String,
    pub origin: String,
    pub destination: String,
    pub insured: bool,
    pub declared_amount: Option<f64>,
    pub verification: Option<Verification>,
    pub booking_id: Option<String>,
    pub booking_snapshot: Option<BookingSnapshot>,
    pub invoice_amount: Option<f64>,
    pub empost_uhawb: Option<String>,
    pub invoice_generated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InvoiceRequest> for InvoiceRequestResponse {
    fn from(request: InvoiceRequest) -> Self {
        Self {
            id: request.request_id,
            invoice_number: request.invoice_number,
            tracking_code: request.tracking_code,
            service_code: request.service_code,
            status: request.status,
            delivery_status: request.delivery_status,
            shipment_type: request.shipment_type,
            customer_name: request.customer_name,
            receiver_name: request.receiver_name,
            origin: request.origin,
            destination: request.destination,
            insured: request.insured,
            declared_amount: request.declared_amount,
            verification: request.verification,
            booking_id: request.booking_id,
            booking_snapshot: request.booking_snapshot,
            invoice_amount: request.invoice_amount,
            empost_uhawb: request.empost_uhawb,
            invoice_generated_at: request.invoice_generated_at.map(|dt| dt.to_rfc3339()),
            created_at: request.created_at.to_rfc3339(),
            updated_at: request.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<InvoiceRequestResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// Review outcome: the reviewed booking plus the invoice request an
/// approval produced.
#[derive(Debug, Serialize)]
pub struct ReviewOutcomeResponse {
    pub booking: super::bookings::BookingResponse,
    pub invoice_request: Option<InvoiceRequestResponse>,
}
