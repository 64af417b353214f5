//! Lifecycle transition engine for bookings and invoice requests.
//!
//! Every state change funnels through here: review and conversion,
//! verification, finance completion and plain status moves. The engine
//! owns transition guards and downstream artifacts; HTTP concerns stay in
//! the handlers and carrier calls are handed to [`CarrierSync`].

use std::sync::Arc;

use anyhow::anyhow;
use service_core::error::AppError;

use super::carrier::StatusUpdate;
use super::identifiers::{unique_invoice_number, unique_tracking_number};
use super::qr::PaymentQrService;
use super::rules::{build_verification, derive_shipment_type, VerificationForm};
use super::store::ShipmentStore;
use super::sync::CarrierSync;
use crate::models::{
    Booking, CollectionEntry, DeliveryAssignment, DeliveryStatus, Invoice, InvoiceRequest,
    InvoiceStatus, ReviewStatus, ServiceCode,
};

/// Identifier regeneration attempts when an insert hits the unique index.
const INSERT_ATTEMPTS: usize = 3;

pub struct LifecycleService {
    store: Arc<dyn ShipmentStore>,
    sync: CarrierSync,
    qr: PaymentQrService,
    currency: String,
}

/// Walk-in shipment accepted at the counter, entered without a booking.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub service: String,
    pub customer_name: String,
    pub receiver_name: String,
    pub origin: String,
    pub destination: String,
    pub insured: bool,
    pub declared_amount: Option<f64>,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn ShipmentStore>,
        sync: CarrierSync,
        qr: PaymentQrService,
        currency: String,
    ) -> Self {
        Self {
            store,
            sync,
            qr,
            currency,
        }
    }

    fn resolve_route(service: &str) -> Result<ServiceCode, AppError> {
        ServiceCode::resolve(service)
            .ok_or_else(|| AppError::field("service", "unrecognized service route"))
    }

    /// Review a booking exactly once. A `reviewed` decision immediately
    /// converts the booking into a SUBMITTED invoice request; `rejected`
    /// leaves it for the retention sweeper.
    #[tracing::instrument(skip(self))]
    pub async fn review_booking(
        &self,
        booking_id: &str,
        decision: ReviewStatus,
        reviewed_by: &str,
    ) -> Result<(Booking, Option<InvoiceRequest>), AppError> {
        if decision == ReviewStatus::NotReviewed {
            return Err(AppError::field(
                "review_status",
                "must be reviewed or rejected",
            ));
        }

        let Some(booking) = self
            .store
            .mark_booking_reviewed(booking_id, decision, reviewed_by)
            .await?
        else {
            let existing = self
                .store
                .get_booking(booking_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow!("Booking {booking_id} not found")))?;

            // A crashed earlier attempt may have reviewed the booking but
            // died before conversion; finish the job instead of refusing.
            if decision == ReviewStatus::Reviewed
                && existing.review_status == ReviewStatus::Reviewed
                && existing.converted_to_invoice_request_id.is_none()
            {
                tracing::warn!(booking_id, "resuming conversion of a reviewed booking");
                let request = self.convert_booking(&existing).await?;
                return Ok((existing, Some(request)));
            }

            return Err(AppError::Conflict(anyhow!(
                "Booking {booking_id} was already reviewed"
            )));
        };

        metrics::counter!("booking_reviews_total", "decision" => decision.as_str()).increment(1);

        if decision == ReviewStatus::Reviewed {
            let request = self.convert_booking(&booking).await?;
            Ok((booking, Some(request)))
        } else {
            Ok((booking, None))
        }
    }

    /// Convert a reviewed booking into a SUBMITTED invoice request. The
    /// conversion claim on the booking and the unique identifier indexes
    /// are the authoritative guards; identifier generation retries on
    /// insert conflicts.
    #[tracing::instrument(skip(self, booking), fields(booking_id = %booking.booking_id))]
    pub async fn convert_booking(&self, booking: &Booking) -> Result<InvoiceRequest, AppError> {
        if booking.converted_to_invoice_request_id.is_some() {
            return Err(AppError::Conflict(anyhow!(
                "Booking {} was already converted",
                booking.booking_id
            )));
        }

        let service_code = Self::resolve_route(&booking.service)?;
        let shipment_type = derive_shipment_type(&booking.items);

        let tracking_code = match &booking.awb {
            Some(awb) if !self.store.tracking_code_in_use(awb).await? => awb.clone(),
            _ => unique_tracking_number(self.store.as_ref(), Some(service_code)).await?,
        };
        let invoice_number = unique_invoice_number(self.store.as_ref()).await?;

        let mut request = InvoiceRequest::from_booking(
            booking,
            service_code,
            shipment_type,
            tracking_code,
            invoice_number,
        );

        let claimed = self
            .store
            .claim_booking_conversion(&booking.booking_id, &request.request_id)
            .await?;
        if !claimed {
            return Err(AppError::Conflict(anyhow!(
                "Booking {} was already converted",
                booking.booking_id
            )));
        }

        for attempt in 1..=INSERT_ATTEMPTS {
            match self.store.insert_request(&request).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %request.request_id,
                        tracking_code = %request.tracking_code,
                        invoice_number = %request.invoice_number,
                        service_code = %request.service_code,
                        "booking converted to invoice request"
                    );
                    metrics::counter!("lifecycle_transitions_total", "to" => "SUBMITTED")
                        .increment(1);
                    return Ok(request);
                }
                Err(AppError::Conflict(_)) if attempt < INSERT_ATTEMPTS => {
                    // Lost the race on an identifier; regenerate both and
                    // try again under the same request id.
                    tracing::warn!(
                        request_id = %request.request_id,
                        attempt,
                        "identifier conflict on insert, regenerating"
                    );
                    request.tracking_code =
                        unique_tracking_number(self.store.as_ref(), Some(service_code)).await?;
                    request.invoice_number = unique_invoice_number(self.store.as_ref()).await?;
                }
                Err(e) => {
                    self.store
                        .release_booking_conversion(&booking.booking_id, &request.request_id)
                        .await?;
                    return Err(e);
                }
            }
        }

        self.store
            .release_booking_conversion(&booking.booking_id, &request.request_id)
            .await?;
        Err(AppError::InternalError(anyhow!(
            "could not allocate unique identifiers for booking {}",
            booking.booking_id
        )))
    }

    /// Create a DRAFT invoice request directly, without a booking.
    #[tracing::instrument(skip(self, draft))]
    pub async fn create_draft(&self, draft: DraftRequest) -> Result<InvoiceRequest, AppError> {
        let service_code = Self::resolve_route(&draft.service)?;

        let mut request = InvoiceRequest::new_draft(
            service_code,
            draft.customer_name,
            draft.receiver_name,
            draft.origin,
            draft.destination,
            draft.insured,
            draft.declared_amount,
            unique_tracking_number(self.store.as_ref(), Some(service_code)).await?,
            unique_invoice_number(self.store.as_ref()).await?,
        );

        for attempt in 1..=INSERT_ATTEMPTS {
            match self.store.insert_request(&request).await {
                Ok(()) => {
                    metrics::counter!("lifecycle_transitions_total", "to" => "DRAFT").increment(1);
                    return Ok(request);
                }
                Err(AppError::Conflict(_)) if attempt < INSERT_ATTEMPTS => {
                    request.tracking_code =
                        unique_tracking_number(self.store.as_ref(), Some(service_code)).await?;
                    request.invoice_number = unique_invoice_number(self.store.as_ref()).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::InternalError(anyhow!(
            "could not allocate unique identifiers for draft request"
        )))
    }

    /// Run the verification rules and store the result. The status stays
    /// where it was; carrier-shipment creation fires on the first
    /// successful submit.
    #[tracing::instrument(skip(self, form))]
    pub async fn submit_verification(
        &self,
        request_id: &str,
        form: &VerificationForm,
    ) -> Result<InvoiceRequest, AppError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice request {request_id} not found")))?;

        let allowed = [InvoiceStatus::Submitted, InvoiceStatus::InProgress];
        if !allowed.contains(&request.status) {
            return Err(AppError::Conflict(anyhow!(
                "verification can only be submitted while SUBMITTED or IN_PROGRESS, current status is {}",
                request.status
            )));
        }

        let verification = build_verification(request.service_code, request.insured, form)?;

        let Some(stored) = self
            .store
            .store_verification(request_id, &verification, &allowed)
            .await?
        else {
            return Err(AppError::Conflict(anyhow!(
                "Invoice request {request_id} changed state during verification"
            )));
        };

        if stored.empost_uhawb.is_none() {
            self.sync.spawn_create(&stored);
        }

        Ok(stored)
    }

    /// Operations action moving the request to VERIFIED. Requires a stored
    /// verification; re-fires carrier creation if the reference is still
    /// missing.
    #[tracing::instrument(skip(self))]
    pub async fn complete_verification(
        &self,
        request_id: &str,
    ) -> Result<InvoiceRequest, AppError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice request {request_id} not found")))?;

        if request.verification.is_none() {
            return Err(AppError::Conflict(anyhow!(
                "Invoice request {request_id} has no submitted verification"
            )));
        }

        let Some(updated) = self
            .store
            .transition_status(
                request_id,
                &[InvoiceStatus::Submitted, InvoiceStatus::InProgress],
                InvoiceStatus::Verified,
            )
            .await?
        else {
            return Err(AppError::Conflict(anyhow!(
                "cannot verify from status {}",
                request.status
            )));
        };

        metrics::counter!("lifecycle_transitions_total", "to" => "VERIFIED").increment(1);

        if updated.empost_uhawb.is_none() {
            self.sync.spawn_create(&updated);
        }
        self.push_status(&updated, InvoiceStatus::Verified.as_str());

        Ok(updated)
    }

    /// Finance action moving VERIFIED to COMPLETED. Stamps the invoice
    /// timestamp, writes the permanent invoice record, opens a collection
    /// entry for positive amounts and refreshes the delivery assignment.
    #[tracing::instrument(skip(self))]
    pub async fn complete_finance(
        &self,
        request_id: &str,
        amount: Option<f64>,
    ) -> Result<InvoiceRequest, AppError> {
        if let Some(amount) = amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(AppError::field(
                    "invoice_amount",
                    "must be a non-negative number",
                ));
            }
        }

        let Some(updated) = self.store.mark_finance_completed(request_id, amount).await? else {
            let request = self.store.get_request(request_id).await?.ok_or_else(|| {
                AppError::NotFound(anyhow!("Invoice request {request_id} not found"))
            })?;
            return Err(AppError::Conflict(anyhow!(
                "only VERIFIED requests can be completed, current status is {}",
                request.status
            )));
        };

        metrics::counter!("lifecycle_transitions_total", "to" => "COMPLETED").increment(1);

        let amount = updated.invoice_amount.unwrap_or(0.0);
        self.record_finance_artifacts(&updated, amount).await;
        self.push_status(&updated, InvoiceStatus::Completed.as_str());

        Ok(updated)
    }

    /// Downstream artifacts of a completion. The status move has already
    /// committed, so failures here are logged and counted instead of
    /// unwinding the transition.
    async fn record_finance_artifacts(&self, request: &InvoiceRequest, amount: f64) {
        let invoice = Invoice::new(
            request.invoice_number.clone(),
            request.request_id.clone(),
            request.tracking_code.clone(),
            amount,
            self.currency.clone(),
        );
        match self.store.insert_invoice(&invoice).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                tracing::debug!(request_id = %request.request_id, "invoice record already exists");
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request.request_id,
                    error = %e,
                    "failed to write invoice record"
                );
                metrics::counter!("finance_artifact_failures_total", "artifact" => "invoice")
                    .increment(1);
            }
        }

        if amount > 0.0 {
            let entry = CollectionEntry::new(
                request.request_id.clone(),
                request.invoice_number.clone(),
                amount,
                self.currency.clone(),
            );
            match self.store.insert_collection(&entry).await {
                Ok(()) => {}
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(
                        request_id = %request.request_id,
                        "collection entry already exists"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request.request_id,
                        error = %e,
                        "failed to write collection entry"
                    );
                    metrics::counter!("finance_artifact_failures_total", "artifact" => "collection")
                        .increment(1);
                }
            }
        }

        let assignment = self.build_assignment(request, amount);
        if let Err(e) = self.store.upsert_assignment(&assignment).await {
            tracing::error!(
                request_id = %request.request_id,
                error = %e,
                "failed to upsert delivery assignment"
            );
            metrics::counter!("finance_artifact_failures_total", "artifact" => "assignment")
                .increment(1);
        }
    }

    fn build_assignment(&self, request: &InvoiceRequest, amount: f64) -> DeliveryAssignment {
        let (receiver_name, receiver_phone, delivery_address) = match &request.booking_snapshot {
            Some(snapshot) => (
                snapshot.receiver.name.clone(),
                snapshot.receiver.phone.clone(),
                snapshot.receiver.address.formatted(),
            ),
            None => (
                request.receiver_name.clone(),
                String::new(),
                request.destination.clone(),
            ),
        };

        let payment_qr = if self.qr.is_configured() {
            match self
                .qr
                .build_payment_qr(&request.tracking_code, amount, &self.currency)
            {
                Ok(qr) => Some(qr),
                Err(e) => {
                    tracing::warn!(
                        tracking_code = %request.tracking_code,
                        error = %e,
                        "payment QR generation failed, assignment goes out without one"
                    );
                    None
                }
            }
        } else {
            None
        };

        DeliveryAssignment::new(
            request.request_id.clone(),
            request.tracking_code.clone(),
            receiver_name,
            receiver_phone,
            delivery_address,
            amount,
            self.currency.clone(),
            payment_qr,
        )
    }

    /// Explicit status move along the lifecycle chain, including
    /// cancellation from any non-terminal state.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        request_id: &str,
        new_status: &str,
    ) -> Result<InvoiceRequest, AppError> {
        let to = InvoiceStatus::from_string(new_status)
            .ok_or_else(|| AppError::field("status", "unknown status"))?;

        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice request {request_id} not found")))?;

        if !request.status.can_transition(to) {
            return Err(AppError::Conflict(anyhow!(
                "cannot transition from {} to {}",
                request.status,
                to
            )));
        }

        let Some(updated) = self
            .store
            .transition_status(request_id, &[request.status], to)
            .await?
        else {
            return Err(AppError::Conflict(anyhow!(
                "Invoice request {request_id} changed state concurrently"
            )));
        };

        metrics::counter!("lifecycle_transitions_total", "to" => to.as_str()).increment(1);
        self.push_status(&updated, to.as_str());

        Ok(updated)
    }

    /// Delivery status is carrier-facing progress; it moves freely and
    /// every change is pushed.
    #[tracing::instrument(skip(self))]
    pub async fn change_delivery_status(
        &self,
        request_id: &str,
        new_status: &str,
        delivery_date: Option<String>,
        notes: Option<String>,
    ) -> Result<InvoiceRequest, AppError> {
        let to = DeliveryStatus::from_string(new_status)
            .ok_or_else(|| AppError::field("delivery_status", "unknown delivery status"))?;

        let Some(updated) = self.store.set_delivery_status(request_id, to).await? else {
            return Err(AppError::NotFound(anyhow!(
                "Invoice request {request_id} not found"
            )));
        };

        self.sync.spawn_status_push(StatusUpdate {
            tracking_code: updated.tracking_code.clone(),
            status: to.as_str().to_string(),
            delivery_date,
            notes,
        });

        Ok(updated)
    }

    fn push_status(&self, request: &InvoiceRequest, status: &str) {
        self.sync.spawn_status_push(StatusUpdate {
            tracking_code: request.tracking_code.clone(),
            status: status.to_string(),
            delivery_date: None,
            notes: None,
        });
    }
}
