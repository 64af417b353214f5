//! Age-based retention sweeper.
//!
//! Deletes reviewed and rejected bookings, invoice requests and delivery
//! assignments once they outlive their retention window. Invoices are
//! permanent; a count assertion after every pass enforces that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::services::store::ShipmentStore;
use crate::models::ReviewStatus;

pub const REVIEWED_BOOKING_DAYS: i64 = 30;
pub const REJECTED_BOOKING_DAYS: i64 = 15;
pub const INVOICE_REQUEST_DAYS: i64 = 30;
pub const DELIVERY_ASSIGNMENT_DAYS: i64 = 30;
/// Extra day on every window so midnight truncation and clock skew can
/// never delete a record early.
pub const SAFETY_MARGIN_DAYS: i64 = 1;
/// Intake OTP cleanup is permanently disabled: the codes are audit data
/// and live until the owning booking is deleted.
pub const OTP_SWEEP_ENABLED: bool = false;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepStatus {
    Completed,
    Skipped,
}

/// Outcome of one sweeper pass, also served from the admin endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub status: SweepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reviewed_bookings_deleted: u64,
    pub rejected_bookings_deleted: u64,
    pub invoice_requests_deleted: u64,
    pub delivery_assignments_deleted: u64,
    pub otp_values_deleted: u64,
    pub errors: u64,
}

impl SweepReport {
    fn skipped(started_at: DateTime<Utc>) -> Self {
        Self {
            status: SweepStatus::Skipped,
            started_at,
            finished_at: Utc::now(),
            reviewed_bookings_deleted: 0,
            rejected_bookings_deleted: 0,
            invoice_requests_deleted: 0,
            delivery_assignments_deleted: 0,
            otp_values_deleted: 0,
            errors: 0,
        }
    }
}

pub struct RetentionSweeper {
    store: Arc<dyn ShipmentStore>,
    running: AtomicBool,
}

/// Candidate cutoff: now minus the window plus safety margin, truncated
/// to midnight UTC.
fn cutoff_for(window_days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    (now - chrono::Duration::days(window_days + SAFETY_MARGIN_DAYS))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Second age check applied to every candidate right before deletion.
fn old_enough(created_at: DateTime<Utc>, window_days: i64, now: DateTime<Utc>) -> bool {
    now - created_at >= chrono::Duration::days(window_days + SAFETY_MARGIN_DAYS)
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ShipmentStore>) -> Self {
        Self {
            store,
            running: AtomicBool::new(false),
        }
    }

    /// Run one sweep pass. A pass already in flight makes this a no-op
    /// that reports `skipped`; per-record failures are counted and logged
    /// but never abort the pass.
    pub async fn run_cleanup(&self) -> SweepReport {
        let started_at = Utc::now();

        if self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("retention sweep already running, skipping this trigger");
            return SweepReport::skipped(started_at);
        }

        let report = self.sweep(started_at).await;
        self.running.store(false, Ordering::SeqCst);

        metrics::histogram!("retention_sweep_duration_seconds")
            .record((report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0);

        tracing::info!(
            reviewed_bookings = report.reviewed_bookings_deleted,
            rejected_bookings = report.rejected_bookings_deleted,
            invoice_requests = report.invoice_requests_deleted,
            delivery_assignments = report.delivery_assignments_deleted,
            errors = report.errors,
            "retention sweep finished"
        );

        report
    }

    async fn sweep(&self, started_at: DateTime<Utc>) -> SweepReport {
        let now = started_at;
        let mut errors: u64 = 0;

        let invoices_before = match self.store.count_invoices().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::error!(error = %e, "failed to count invoices before sweep");
                errors += 1;
                None
            }
        };

        let reviewed_bookings_deleted = self
            .sweep_bookings(ReviewStatus::Reviewed, REVIEWED_BOOKING_DAYS, now, &mut errors)
            .await;
        let rejected_bookings_deleted = self
            .sweep_bookings(ReviewStatus::Rejected, REJECTED_BOOKING_DAYS, now, &mut errors)
            .await;
        let invoice_requests_deleted = self.sweep_requests(now, &mut errors).await;
        let delivery_assignments_deleted = self.sweep_assignments(now, &mut errors).await;

        let otp_values_deleted = 0;
        if OTP_SWEEP_ENABLED {
            tracing::warn!("OTP sweep flag is set but the sweep path stays disabled");
        }

        if let Some(before) = invoices_before {
            match self.store.count_invoices().await {
                Ok(after) if after < before => {
                    tracing::error!(
                        before,
                        after,
                        "invoice count dropped during retention sweep"
                    );
                    metrics::counter!("retention_invoice_count_mismatch_total").increment(1);
                    errors += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed to count invoices after sweep");
                    errors += 1;
                }
            }
        }

        SweepReport {
            status: SweepStatus::Completed,
            started_at,
            finished_at: Utc::now(),
            reviewed_bookings_deleted,
            rejected_bookings_deleted,
            invoice_requests_deleted,
            delivery_assignments_deleted,
            otp_values_deleted,
            errors,
        }
    }

    async fn sweep_bookings(
        &self,
        review_status: ReviewStatus,
        window_days: i64,
        now: DateTime<Utc>,
        errors: &mut u64,
    ) -> u64 {
        let cutoff = cutoff_for(window_days, now);
        let candidates = match self.store.bookings_for_retention(review_status, cutoff).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(
                    review_status = %review_status,
                    error = %e,
                    "failed to query bookings for retention"
                );
                *errors += 1;
                return 0;
            }
        };

        let mut deleted = 0;
        for booking in candidates {
            if !old_enough(booking.created_at, window_days, now) {
                continue;
            }
            match self.store.delete_booking(&booking.booking_id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        booking_id = %booking.booking_id,
                        error = %e,
                        "failed to delete aged booking"
                    );
                    *errors += 1;
                }
            }
        }

        metrics::counter!("retention_deleted_total", "category" => category_label(review_status))
            .increment(deleted);
        deleted
    }

    async fn sweep_requests(&self, now: DateTime<Utc>, errors: &mut u64) -> u64 {
        let cutoff = cutoff_for(INVOICE_REQUEST_DAYS, now);
        let candidates = match self.store.requests_for_retention(cutoff).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "failed to query invoice requests for retention");
                *errors += 1;
                return 0;
            }
        };

        let mut deleted = 0;
        for request in candidates {
            if !old_enough(request.created_at, INVOICE_REQUEST_DAYS, now) {
                continue;
            }
            match self.store.delete_request(&request.request_id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        request_id = %request.request_id,
                        error = %e,
                        "failed to delete aged invoice request"
                    );
                    *errors += 1;
                }
            }
        }

        metrics::counter!("retention_deleted_total", "category" => "invoice_request")
            .increment(deleted);
        deleted
    }

    async fn sweep_assignments(&self, now: DateTime<Utc>, errors: &mut u64) -> u64 {
        let cutoff = cutoff_for(DELIVERY_ASSIGNMENT_DAYS, now);
        let candidates = match self.store.assignments_for_retention(cutoff).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "failed to query delivery assignments for retention");
                *errors += 1;
                return 0;
            }
        };

        let mut deleted = 0;
        for assignment in candidates {
            if !old_enough(assignment.created_at, DELIVERY_ASSIGNMENT_DAYS, now) {
                continue;
            }
            match self.store.delete_assignment(&assignment.assignment_id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        assignment_id = %assignment.assignment_id,
                        error = %e,
                        "failed to delete aged delivery assignment"
                    );
                    *errors += 1;
                }
            }
        }

        metrics::counter!("retention_deleted_total", "category" => "delivery_assignment")
            .increment(deleted);
        deleted
    }

    /// Loop driving the sweeper on a fixed period until shutdown. The
    /// first pass runs one full period after startup.
    pub async fn run_interval(self: Arc<Self>, period: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("retention sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cleanup().await;
                }
            }
        }
    }
}

fn category_label(review_status: ReviewStatus) -> &'static str {
    match review_status {
        ReviewStatus::Reviewed => "reviewed_booking",
        ReviewStatus::Rejected => "rejected_booking",
        ReviewStatus::NotReviewed => "not_reviewed_booking",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use service_core::error::AppError;
    use tokio::sync::Notify;

    use crate::models::{
        Booking, CollectionEntry, DeliveryAssignment, DeliveryStatus, Invoice, InvoiceRequest,
        InvoiceStatus, Verification,
    };
    use crate::services::store::{
        BookingFilter, IdentifierIndex, PageRequest, Paged, RequestFilter,
    };

    /// Store double whose first invoice count blocks until released,
    /// holding a sweep pass open so the overlap guard can be observed.
    struct StalledStore {
        entered: Notify,
        release: Notify,
        first_call: AtomicBool,
    }

    impl StalledStore {
        fn new() -> Self {
            Self {
                entered: Notify::new(),
                release: Notify::new(),
                first_call: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl IdentifierIndex for StalledStore {
        async fn tracking_code_in_use(&self, _code: &str) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn invoice_number_in_use(&self, _number: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    #[async_trait]
    impl ShipmentStore for StalledStore {
        async fn insert_booking(&self, _booking: &Booking) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_booking(&self, _booking_id: &str) -> Result<Option<Booking>, AppError> {
            Ok(None)
        }

        async fn list_bookings(
            &self,
            _filter: &BookingFilter,
            _page: &PageRequest,
        ) -> Result<Paged<Booking>, AppError> {
            Ok(Paged {
                items: vec![],
                total: 0,
            })
        }

        async fn mark_booking_reviewed(
            &self,
            _booking_id: &str,
            _status: ReviewStatus,
            _reviewed_by: &str,
        ) -> Result<Option<Booking>, AppError> {
            Ok(None)
        }

        async fn claim_booking_conversion(
            &self,
            _booking_id: &str,
            _request_id: &str,
        ) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn release_booking_conversion(
            &self,
            _booking_id: &str,
            _request_id: &str,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn delete_booking(&self, _booking_id: &str) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn bookings_for_retention(
            &self,
            _review_status: ReviewStatus,
            _cutoff: DateTime<Utc>,
        ) -> Result<Vec<Booking>, AppError> {
            Ok(vec![])
        }

        async fn insert_request(&self, _request: &InvoiceRequest) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_request(
            &self,
            _request_id: &str,
        ) -> Result<Option<InvoiceRequest>, AppError> {
            Ok(None)
        }

        async fn find_request_by_tracking(
            &self,
            _code: &str,
        ) -> Result<Option<InvoiceRequest>, AppError> {
            Ok(None)
        }

        async fn list_requests(
            &self,
            _filter: &RequestFilter,
            _page: &PageRequest,
        ) -> Result<Paged<InvoiceRequest>, AppError> {
            Ok(Paged {
                items: vec![],
                total: 0,
            })
        }

        async fn store_verification(
            &self,
            _request_id: &str,
            _verification: &Verification,
            _allowed_from: &[InvoiceStatus],
        ) -> Result<Option<InvoiceRequest>, AppError> {
            Ok(None)
        }

        async fn transition_status(
            &self,
            _request_id: &str,
            _allowed_from: &[InvoiceStatus],
            _to: InvoiceStatus,
        ) -> Result<Option<InvoiceRequest>, AppError> {
            Ok(None)
        }

        async fn set_delivery_status(
            &self,
            _request_id: &str,
            _to: DeliveryStatus,
        ) -> Result<Option<InvoiceRequest>, AppError> {
            Ok(None)
        }

        async fn set_carrier_ref_if_absent(
            &self,
            _request_id: &str,
            _uhawb: &str,
        ) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn mark_finance_completed(
            &self,
            _request_id: &str,
            _amount: Option<f64>,
        ) -> Result<Option<InvoiceRequest>, AppError> {
            Ok(None)
        }

        async fn delete_request(&self, _request_id: &str) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn requests_for_retention(
            &self,
            _cutoff: DateTime<Utc>,
        ) -> Result<Vec<InvoiceRequest>, AppError> {
            Ok(vec![])
        }

        async fn insert_invoice(&self, _invoice: &Invoice) -> Result<(), AppError> {
            Ok(())
        }

        async fn count_invoices(&self) -> Result<u64, AppError> {
            if self.first_call.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(0)
        }

        async fn insert_collection(&self, _entry: &CollectionEntry) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_collection_for_request(
            &self,
            _request_id: &str,
        ) -> Result<Option<CollectionEntry>, AppError> {
            Ok(None)
        }

        async fn upsert_assignment(
            &self,
            _assignment: &DeliveryAssignment,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_assignment_for_request(
            &self,
            _request_id: &str,
        ) -> Result<Option<DeliveryAssignment>, AppError> {
            Ok(None)
        }

        async fn delete_assignment(&self, _assignment_id: &str) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn assignments_for_retention(
            &self,
            _cutoff: DateTime<Utc>,
        ) -> Result<Vec<DeliveryAssignment>, AppError> {
            Ok(vec![])
        }

        async fn ping(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_trigger_is_skipped_while_a_pass_runs() {
        let store = Arc::new(StalledStore::new());
        let sweeper = Arc::new(RetentionSweeper::new(store.clone()));

        let background = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.run_cleanup().await })
        };
        store.entered.notified().await;

        let report = sweeper.run_cleanup().await;
        assert_eq!(report.status, SweepStatus::Skipped);
        assert_eq!(report.reviewed_bookings_deleted, 0);

        store.release.notify_one();
        let report = background.await.unwrap();
        assert_eq!(report.status, SweepStatus::Completed);

        // The guard clears once the pass is over.
        let report = sweeper.run_cleanup().await;
        assert_eq!(report.status, SweepStatus::Completed);
    }

    #[test]
    fn cutoff_truncates_to_midnight() {
        let now = DateTime::parse_from_rfc3339("2026-08-24T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let cutoff = cutoff_for(30, now);
        assert_eq!(cutoff.to_rfc3339(), "2026-07-24T00:00:00+00:00");
    }

    #[test]
    fn age_check_needs_window_plus_margin() {
        let now = Utc::now();
        assert!(!old_enough(now - chrono::Duration::days(30), 30, now));
        assert!(!old_enough(
            now - chrono::Duration::days(30) - chrono::Duration::hours(23),
            30,
            now
        ));
        assert!(old_enough(now - chrono::Duration::days(31), 30, now));
        assert!(old_enough(now - chrono::Duration::days(32), 30, now));
    }
}
