use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use tokio::sync::RwLock;

use super::{BookingFilter, IdentifierIndex, PageRequest, Paged, RequestFilter, ShipmentStore};
use crate::models::{
    Booking, CollectionEntry, DeliveryAssignment, DeliveryStatus, Invoice, InvoiceRequest,
    InvoiceStatus, ReviewStatus, Verification,
};

#[derive(Default)]
struct Inner {
    bookings: HashMap<String, Booking>,
    requests: HashMap<String, InvoiceRequest>,
    invoices: Vec<Invoice>,
    collections: HashMap<String, CollectionEntry>,
    assignments: HashMap<String, DeliveryAssignment>,
}

/// In-process backend with the same query and guard semantics as the
/// MongoDB store, including uniqueness conflicts on insert. Mutations run
/// under one lock, which makes the conditional guards race-safe.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_tracking(request: &InvoiceRequest, code: &str) -> bool {
    request.tracking_code == code
}

fn page_slice<T>(mut items: Vec<T>, page: &PageRequest) -> Paged<T> {
    let total = items.len() as u64;
    let page = page.clamped();
    let start = page.skip().min(total) as usize;
    let end = (page.skip() + page.page_size).min(total) as usize;
    Paged {
        items: items.drain(start..end).collect(),
        total,
    }
}

#[async_trait]
impl IdentifierIndex for MemoryStore {
    async fn tracking_code_in_use(&self, code: &str) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.values().any(|r| matches_tracking(r, code)))
    }

    async fn invoice_number_in_use(&self, number: &str) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.values().any(|r| r.invoice_number == number))
    }
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.bookings.contains_key(&booking.booking_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "booking {} already exists",
                booking.booking_id
            )));
        }
        inner
            .bookings
            .insert(booking.booking_id.clone(), booking.clone());
        Ok(())
    }

    async fn get_booking(&self, booking_id: &str) -> Result<Option<Booking>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.bookings.get(booking_id).cloned())
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: &PageRequest,
    ) -> Result<Paged<Booking>, AppError> {
        let inner = self.inner.read().await;
        let mut items: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| {
                filter
                    .review_status
                    .map_or(true, |status| b.review_status == status)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page_slice(items, page))
    }

    async fn mark_booking_reviewed(
        &self,
        booking_id: &str,
        status: ReviewStatus,
        reviewed_by: &str,
    ) -> Result<Option<Booking>, AppError> {
        let mut inner = self.inner.write().await;
        match inner.bookings.get_mut(booking_id) {
            Some(booking) if booking.review_status == ReviewStatus::NotReviewed => {
                booking.mark_reviewed(status, reviewed_by);
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn claim_booking_conversion(
        &self,
        booking_id: &str,
        request_id: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        match inner.bookings.get_mut(booking_id) {
            Some(booking) if booking.converted_to_invoice_request_id.is_none() => {
                booking.converted_to_invoice_request_id = Some(request_id.to_string());
                booking.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_booking_conversion(
        &self,
        booking_id: &str,
        request_id: &str,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if let Some(booking) = inner.bookings.get_mut(booking_id) {
            if booking.converted_to_invoice_request_id.as_deref() == Some(request_id) {
                booking.converted_to_invoice_request_id = None;
                booking.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn delete_booking(&self, booking_id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner.bookings.remove(booking_id).is_some())
    }

    async fn bookings_for_retention(
        &self,
        review_status: ReviewStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.review_status == review_status && b.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn insert_request(&self, request: &InvoiceRequest) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.requests.contains_key(&request.request_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "invoice request {} already exists",
                request.request_id
            )));
        }
        let duplicate = inner.requests.values().any(|existing| {
            matches_tracking(existing, &request.tracking_code)
                || existing.invoice_number == request.invoice_number
        });
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "duplicate tracking code or invoice number"
            )));
        }
        inner
            .requests
            .insert(request.request_id.clone(), request.clone());
        Ok(())
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<InvoiceRequest>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.get(request_id).cloned())
    }

    async fn find_request_by_tracking(
        &self,
        code: &str,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .requests
            .values()
            .find(|r| matches_tracking(r, code))
            .cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<Paged<InvoiceRequest>, AppError> {
        let inner = self.inner.read().await;
        let mut items: Vec<InvoiceRequest> = inner
            .requests
            .values()
            .filter(|r| filter.status.map_or(true, |status| r.status == status))
            .filter(|r| {
                filter
                    .service_code
                    .map_or(true, |code| r.service_code == code)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page_slice(items, page))
    }

    async fn store_verification(
        &self,
        request_id: &str,
        verification: &Verification,
        allowed_from: &[InvoiceStatus],
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(request_id) {
            Some(request) if allowed_from.contains(&request.status) => {
                request.verification = Some(verification.clone());
                request.updated_at = Utc::now();
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_status(
        &self,
        request_id: &str,
        allowed_from: &[InvoiceStatus],
        to: InvoiceStatus,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(request_id) {
            Some(request) if allowed_from.contains(&request.status) => {
                request.status = to;
                request.updated_at = Utc::now();
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_delivery_status(
        &self,
        request_id: &str,
        to: DeliveryStatus,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(request_id) {
            Some(request) => {
                request.delivery_status = to;
                request.updated_at = Utc::now();
                Ok(Some(request.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set_carrier_ref_if_absent(
        &self,
        request_id: &str,
        uhawb: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(request_id) {
            Some(request) if request.empost_uhawb.is_none() => {
                request.empost_uhawb = Some(uhawb.to_string());
                request.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_finance_completed(
        &self,
        request_id: &str,
        amount: Option<f64>,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(request_id) {
            Some(request) if request.status == InvoiceStatus::Verified => {
                let now = Utc::now();
                request.status = InvoiceStatus::Completed;
                if amount.is_some() {
                    request.invoice_amount = amount;
                }
                request.invoice_generated_at = Some(now);
                request.updated_at = now;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_request(&self, request_id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner.requests.remove(request_id).is_some())
    }

    async fn requests_for_retention(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<InvoiceRequest>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .requests
            .values()
            .filter(|r| r.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner
            .invoices
            .iter()
            .any(|i| i.invoice_request_id == invoice.invoice_request_id)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "invoice already generated for request {}",
                invoice.invoice_request_id
            )));
        }
        inner.invoices.push(invoice.clone());
        Ok(())
    }

    async fn count_invoices(&self) -> Result<u64, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.invoices.len() as u64)
    }

    async fn insert_collection(&self, entry: &CollectionEntry) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner
            .collections
            .values()
            .any(|c| c.invoice_request_id == entry.invoice_request_id)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "collection entry already exists for request {}",
                entry.invoice_request_id
            )));
        }
        inner
            .collections
            .insert(entry.collection_id.clone(), entry.clone());
        Ok(())
    }

    async fn get_collection_for_request(
        &self,
        request_id: &str,
    ) -> Result<Option<CollectionEntry>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .collections
            .values()
            .find(|c| c.invoice_request_id == request_id)
            .cloned())
    }

    async fn upsert_assignment(&self, assignment: &DeliveryAssignment) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let existing_id = inner
            .assignments
            .values()
            .find(|a| a.invoice_request_id == assignment.invoice_request_id)
            .map(|a| a.assignment_id.clone());
        match existing_id {
            Some(assignment_id) => {
                // Refresh in place, keeping the original id and created_at.
                if let Some(entry) = inner.assignments.get_mut(&assignment_id) {
                    entry.tracking_code = assignment.tracking_code.clone();
                    entry.receiver_name = assignment.receiver_name.clone();
                    entry.receiver_phone = assignment.receiver_phone.clone();
                    entry.delivery_address = assignment.delivery_address.clone();
                    entry.amount = assignment.amount;
                    entry.currency = assignment.currency.clone();
                    entry.payment_qr = assignment.payment_qr.clone();
                    entry.updated_at = Utc::now();
                }
            }
            None => {
                inner
                    .assignments
                    .insert(assignment.assignment_id.clone(), assignment.clone());
            }
        }
        Ok(())
    }

    async fn get_assignment_for_request(
        &self,
        request_id: &str,
    ) -> Result<Option<DeliveryAssignment>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .assignments
            .values()
            .find(|a| a.invoice_request_id == request_id)
            .cloned())
    }

    async fn delete_assignment(&self, assignment_id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner.assignments.remove(assignment_id).is_some())
    }

    async fn assignments_for_retention(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DeliveryAssignment>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .assignments
            .values()
            .filter(|a| a.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
