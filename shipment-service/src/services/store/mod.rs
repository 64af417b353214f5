//! Persistence abstraction over the five shipment collections.
//!
//! Two backends implement the same findOne/update/delete semantics: a
//! MongoDB store for deployments and an in-process store for local runs
//! and tests. Guarded updates (review, conversion claim, status
//! transitions) carry their precondition into the store call so the
//! backend can apply it atomically.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::{
    Booking, CollectionEntry, DeliveryAssignment, DeliveryStatus, Invoice, InvoiceRequest,
    InvoiceStatus, ReviewStatus, ServiceCode, Verification,
};

/// Narrow read-side seam used by the identifier generator: "is this
/// candidate already taken under any of its spellings?".
#[async_trait]
pub trait IdentifierIndex: Send + Sync {
    async fn tracking_code_in_use(&self, code: &str) -> Result<bool, AppError>;
    async fn invoice_number_in_use(&self, number: &str) -> Result<bool, AppError>;
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

impl PageRequest {
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, 100),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BookingFilter {
    pub review_status: Option<ReviewStatus>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFilter {
    pub status: Option<InvoiceStatus>,
    pub service_code: Option<ServiceCode>,
}

#[async_trait]
pub trait ShipmentStore: IdentifierIndex {
    // Bookings
    async fn insert_booking(&self, booking: &Booking) -> Result<(), AppError>;
    async fn get_booking(&self, booking_id: &str) -> Result<Option<Booking>, AppError>;
    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: &PageRequest,
    ) -> Result<Paged<Booking>, AppError>;
    /// Single-shot review: succeeds only while the booking is still
    /// `not_reviewed`. Returns the updated booking, or `None` when the
    /// guard did not match.
    async fn mark_booking_reviewed(
        &self,
        booking_id: &str,
        status: ReviewStatus,
        reviewed_by: &str,
    ) -> Result<Option<Booking>, AppError>;
    /// Conditional conversion claim on `converted_to_invoice_request_id`.
    /// Returns false when another conversion already holds the booking.
    async fn claim_booking_conversion(
        &self,
        booking_id: &str,
        request_id: &str,
    ) -> Result<bool, AppError>;
    /// Undo a claim that could not be completed. Only releases when the
    /// claim still belongs to `request_id`.
    async fn release_booking_conversion(
        &self,
        booking_id: &str,
        request_id: &str,
    ) -> Result<(), AppError>;
    async fn delete_booking(&self, booking_id: &str) -> Result<bool, AppError>;
    async fn bookings_for_retention(
        &self,
        review_status: ReviewStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, AppError>;

    // Invoice requests
    /// Insert fails with `Conflict` when the tracking code or invoice
    /// number is already taken; this is the authoritative uniqueness guard.
    async fn insert_request(&self, request: &InvoiceRequest) -> Result<(), AppError>;
    async fn get_request(&self, request_id: &str) -> Result<Option<InvoiceRequest>, AppError>;
    async fn find_request_by_tracking(
        &self,
        code: &str,
    ) -> Result<Option<InvoiceRequest>, AppError>;
    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<Paged<InvoiceRequest>, AppError>;
    /// Store verification output while the request is still in one of
    /// `allowed_from`; `None` when the status guard did not match.
    async fn store_verification(
        &self,
        request_id: &str,
        verification: &Verification,
        allowed_from: &[InvoiceStatus],
    ) -> Result<Option<InvoiceRequest>, AppError>;
    /// Guarded status move: applies only while the current status is in
    /// `allowed_from`.
    async fn transition_status(
        &self,
        request_id: &str,
        allowed_from: &[InvoiceStatus],
        to: InvoiceStatus,
    ) -> Result<Option<InvoiceRequest>, AppError>;
    async fn set_delivery_status(
        &self,
        request_id: &str,
        to: DeliveryStatus,
    ) -> Result<Option<InvoiceRequest>, AppError>;
    /// Record the carrier handle only if none is present yet. Returns
    /// false when a handle was already set.
    async fn set_carrier_ref_if_absent(
        &self,
        request_id: &str,
        uhawb: &str,
    ) -> Result<bool, AppError>;
    /// VERIFIED -> COMPLETED plus invoice amount and generation stamp, in
    /// one guarded update.
    async fn mark_finance_completed(
        &self,
        request_id: &str,
        amount: Option<f64>,
    ) -> Result<Option<InvoiceRequest>, AppError>;
    async fn delete_request(&self, request_id: &str) -> Result<bool, AppError>;
    async fn requests_for_retention(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<InvoiceRequest>, AppError>;

    // Invoices
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;
    async fn count_invoices(&self) -> Result<u64, AppError>;

    // Collections
    /// Fails with `Conflict` when a collection entry already exists for
    /// the same invoice request.
    async fn insert_collection(&self, entry: &CollectionEntry) -> Result<(), AppError>;
    async fn get_collection_for_request(
        &self,
        request_id: &str,
    ) -> Result<Option<CollectionEntry>, AppError>;

    // Delivery assignments
    async fn upsert_assignment(&self, assignment: &DeliveryAssignment) -> Result<(), AppError>;
    async fn get_assignment_for_request(
        &self,
        request_id: &str,
    ) -> Result<Option<DeliveryAssignment>, AppError>;
    async fn delete_assignment(&self, assignment_id: &str) -> Result<bool, AppError>;
    async fn assignments_for_retention(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DeliveryAssignment>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}
