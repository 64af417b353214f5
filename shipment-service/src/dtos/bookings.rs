use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    Booking, BookingItem, ContactInfo, IdentityDocument, ReviewStatus,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, message = "Service route is required"))]
    pub service: String,
    pub sender: ContactInfo,
    pub receiver: ContactInfo,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<BookingItem>,
    #[serde(default)]
    pub insured: bool,
    pub declared_amount: Option<f64>,
    pub awb: Option<String>,
    pub otp: Option<String>,
    #[serde(default)]
    pub identity_documents: Vec<IdentityDocument>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBookingRequest {
    pub decision: ReviewStatus,
    pub reviewed_by: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub review_status: Option<ReviewStatus>,
    pub fields: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FieldsParams {
    pub fields: Option<String>,
}

/// Booking as served over the API. The intake OTP never leaves the store.
#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: String,
    pub service: String,
    pub sender: ContactInfo,
    pub receiver: ContactInfo,
    pub items: Vec<BookingItem>,
    pub insured: bool,
    pub declared_amount: Option<f64>,
    pub awb: Option<String>,
    pub identity_documents: Vec<IdentityDocument>,
    pub review_status: ReviewStatus,
    pub reviewed_at: Option<String>,
    pub reviewed_by: Option<String>,
    pub converted_to_invoice_request_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.booking_id,
            service: booking.service,
            sender: booking.sender,
            receiver: booking.receiver,
            items: booking.items,
            insured: booking.insured,
            declared_amount: booking.declared_amount,
            awb: booking.awb,
            identity_documents: booking.identity_documents,
            review_status: booking.review_status,
            reviewed_at: booking.reviewed_at.map(|dt| dt.to_rfc3339()),
            reviewed_by: booking.reviewed_by,
            converted_to_invoice_request_id: booking.converted_to_invoice_request_id,
            created_at: booking.created_at.to_rfc3339(),
            updated_at: booking.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}
