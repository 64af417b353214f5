use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, UpdateOptions,
};
use mongodb::{Collection, Database, IndexModel};
use service_core::error::AppError;

use super::{BookingFilter, IdentifierIndex, PageRequest, Paged, RequestFilter, ShipmentStore};
use crate::models::{
    Booking, CollectionEntry, DeliveryAssignment, DeliveryStatus, Invoice, InvoiceRequest,
    InvoiceStatus, ReviewStatus, Verification,
};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Filter matching every historical spelling of the tracking identifier.
fn tracking_filter(code: &str) -> Document {
    doc! {
        "$or": [
            { "tracking_code": code },
            { "awb_number": code },
            { "awb": code },
        ]
    }
}

fn invoice_number_filter(number: &str) -> Document {
    doc! {
        "$or": [
            { "invoice_number": number },
            { "invoice_id": number },
        ]
    }
}

fn status_in(allowed_from: &[InvoiceStatus]) -> Bson {
    Bson::Array(
        allowed_from
            .iter()
            .map(|status| Bson::String(status.as_str().to_string()))
            .collect(),
    )
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_err))
            if write_err.code == DUPLICATE_KEY_CODE
    )
}

fn map_insert_err(err: mongodb::error::Error, what: &str) -> AppError {
    if is_duplicate_key(&err) {
        AppError::Conflict(anyhow::anyhow!("{what} already exists"))
    } else {
        AppError::DatabaseError(anyhow::anyhow!(err))
    }
}

#[derive(Clone)]
pub struct MongoStore {
    bookings: Collection<Booking>,
    requests: Collection<InvoiceRequest>,
    invoices: Collection<Invoice>,
    collections: Collection<CollectionEntry>,
    assignments: Collection<DeliveryAssignment>,
    db: Database,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            bookings: db.collection("bookings"),
            requests: db.collection("invoice_requests"),
            invoices: db.collection("invoices"),
            collections: db.collection("collections"),
            assignments: db.collection("delivery_assignments"),
            db: db.clone(),
        }
    }

    /// Create the indexes the store relies on. The unique indexes on
    /// tracking_code and invoice_number are the authoritative uniqueness
    /// guard behind the identifier generator's existence pre-checks.
    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let tracking_idx = IndexModel::builder()
            .keys(doc! { "tracking_code": 1 })
            .options(
                IndexOptions::builder()
                    .name("tracking_code_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let invoice_number_idx = IndexModel::builder()
            .keys(doc! { "invoice_number": 1 })
            .options(
                IndexOptions::builder()
                    .name("invoice_number_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let request_id_idx = IndexModel::builder()
            .keys(doc! { "request_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("request_id_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let request_status_idx = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("request_status_created_idx".to_string())
                    .build(),
            )
            .build();

        self.requests
            .create_indexes(
                [
                    tracking_idx,
                    invoice_number_idx,
                    request_id_idx,
                    request_status_idx,
                ],
                None,
            )
            .await?;

        let booking_id_idx = IndexModel::builder()
            .keys(doc! { "booking_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_id_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let booking_review_idx = IndexModel::builder()
            .keys(doc! { "review_status": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_review_created_idx".to_string())
                    .build(),
            )
            .build();

        self.bookings
            .create_indexes([booking_id_idx, booking_review_idx], None)
            .await?;

        let invoice_request_ref_idx = IndexModel::builder()
            .keys(doc! { "invoice_request_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("invoice_request_ref_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.invoices
            .create_indexes([invoice_request_ref_idx.clone()], None)
            .await?;
        self.collections
            .create_indexes([invoice_request_ref_idx.clone()], None)
            .await?;
        self.assignments
            .create_indexes([invoice_request_ref_idx], None)
            .await?;

        tracing::info!("Shipment store indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl IdentifierIndex for MongoStore {
    async fn tracking_code_in_use(&self, code: &str) -> Result<bool, AppError> {
        let count = self
            .requests
            .count_documents(tracking_filter(code), None)
            .await?;
        Ok(count > 0)
    }

    async fn invoice_number_in_use(&self, number: &str) -> Result<bool, AppError> {
        let count = self
            .requests
            .count_documents(invoice_number_filter(number), None)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl ShipmentStore for MongoStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<(), AppError> {
        self.bookings
            .insert_one(booking, None)
            .await
            .map_err(|e| map_insert_err(e, "booking"))?;
        Ok(())
    }

    async fn get_booking(&self, booking_id: &str) -> Result<Option<Booking>, AppError> {
        let booking = self
            .bookings
            .find_one(doc! { "booking_id": booking_id }, None)
            .await?;
        Ok(booking)
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: &PageRequest,
    ) -> Result<Paged<Booking>, AppError> {
        let mut query = doc! {};
        if let Some(status) = filter.review_status {
            query.insert("review_status", status.as_str());
        }

        let total = self.bookings.count_documents(query.clone(), None).await?;

        let page = page.clamped();
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(page.skip())
            .limit(page.page_size as i64)
            .build();
        let cursor = self.bookings.find(query, Some(options)).await?;
        let items: Vec<Booking> = cursor.try_collect().await?;

        Ok(Paged { items, total })
    }

    async fn mark_booking_reviewed(
        &self,
        booking_id: &str,
        status: ReviewStatus,
        reviewed_by: &str,
    ) -> Result<Option<Booking>, AppError> {
        let filter = doc! {
            "booking_id": booking_id,
            "review_status": ReviewStatus::NotReviewed.as_str(),
        };
        let update = doc! {
            "$set": {
                "review_status": status.as_str(),
                "reviewed_at": BsonDateTime::now(),
                "reviewed_by": reviewed_by,
                "updated_at": BsonDateTime::now(),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let booking = self
            .bookings
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(booking)
    }

    async fn claim_booking_conversion(
        &self,
        booking_id: &str,
        request_id: &str,
    ) -> Result<bool, AppError> {
        let filter = doc! {
            "booking_id": booking_id,
            "converted_to_invoice_request_id": Bson::Null,
        };
        let update = doc! {
            "$set": {
                "converted_to_invoice_request_id": request_id,
                "updated_at": BsonDateTime::now(),
            }
        };
        let result = self.bookings.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn release_booking_conversion(
        &self,
        booking_id: &str,
        request_id: &str,
    ) -> Result<(), AppError> {
        let filter = doc! {
            "booking_id": booking_id,
            "converted_to_invoice_request_id": request_id,
        };
        let update = doc! {
            "$unset": { "converted_to_invoice_request_id": "" },
            "$set": { "updated_at": BsonDateTime::now() },
        };
        self.bookings.update_one(filter, update, None).await?;
        Ok(())
    }

    async fn delete_booking(&self, booking_id: &str) -> Result<bool, AppError> {
        let result = self
            .bookings
            .delete_one(doc! { "booking_id": booking_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn bookings_for_retention(
        &self,
        review_status: ReviewStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, AppError> {
        let filter = doc! {
            "review_status": review_status.as_str(),
            "created_at": { "$lt": BsonDateTime::from_chrono(cutoff) },
        };
        let cursor = self.bookings.find(filter, None).await?;
        let bookings: Vec<Booking> = cursor.try_collect().await?;
        Ok(bookings)
    }

    async fn insert_request(&self, request: &InvoiceRequest) -> Result<(), AppError> {
        self.requests
            .insert_one(request, None)
            .await
            .map_err(|e| map_insert_err(e, "invoice request"))?;
        Ok(())
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<InvoiceRequest>, AppError> {
        let request = self
            .requests
            .find_one(doc! { "request_id": request_id }, None)
            .await?;
        Ok(request)
    }

    async fn find_request_by_tracking(
        &self,
        code: &str,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let request = self.requests.find_one(tracking_filter(code), None).await?;
        Ok(request)
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<Paged<InvoiceRequest>, AppError> {
        let mut query = doc! {};
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        if let Some(code) = filter.service_code {
            query.insert("service_code", code.as_str());
        }

        let total = self.requests.count_documents(query.clone(), None).await?;

        let page = page.clamped();
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(page.skip())
            .limit(page.page_size as i64)
            .build();
        let cursor = self.requests.find(query, Some(options)).await?;
        let items: Vec<InvoiceRequest> = cursor.try_collect().await?;

        Ok(Paged { items, total })
    }

    async fn store_verification(
        &self,
        request_id: &str,
        verification: &Verification,
        allowed_from: &[InvoiceStatus],
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let filter = doc! {
            "request_id": request_id,
            "status": { "$in": status_in(allowed_from) },
        };
        let update = doc! {
            "$set": {
                "verification": mongodb::bson::to_bson(verification)
                    .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?,
                "updated_at": BsonDateTime::now(),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let request = self
            .requests
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(request)
    }

    async fn transition_status(
        &self,
        request_id: &str,
        allowed_from: &[InvoiceStatus],
        to: InvoiceStatus,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let filter = doc! {
            "request_id": request_id,
            "status": { "$in": status_in(allowed_from) },
        };
        let update = doc! {
            "$set": {
                "status": to.as_str(),
                "updated_at": BsonDateTime::now(),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let request = self
            .requests
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(request)
    }

    async fn set_delivery_status(
        &self,
        request_id: &str,
        to: DeliveryStatus,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let update = doc! {
            "$set": {
                "delivery_status": to.as_str(),
                "updated_at": BsonDateTime::now(),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let request = self
            .requests
            .find_one_and_update(doc! { "request_id": request_id }, update, options)
            .await?;
        Ok(request)
    }

    async fn set_carrier_ref_if_absent(
        &self,
        request_id: &str,
        uhawb: &str,
    ) -> Result<bool, AppError> {
        let filter = doc! {
            "request_id": request_id,
            "empost_uhawb": Bson::Null,
        };
        let update = doc! {
            "$set": {
                "empost_uhawb": uhawb,
                "updated_at": BsonDateTime::now(),
            }
        };
        let result = self.requests.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn mark_finance_completed(
        &self,
        request_id: &str,
        amount: Option<f64>,
    ) -> Result<Option<InvoiceRequest>, AppError> {
        let filter = doc! {
            "request_id": request_id,
            "status": InvoiceStatus::Verified.as_str(),
        };
        let mut set = doc! {
            "status": InvoiceStatus::Completed.as_str(),
            "invoice_generated_at": BsonDateTime::now(),
            "updated_at": BsonDateTime::now(),
        };
        if let Some(amount) = amount {
            set.insert("invoice_amount", amount);
        }
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let request = self
            .requests
            .find_one_and_update(filter, doc! { "$set": set }, options)
            .await?;
        Ok(request)
    }

    async fn delete_request(&self, request_id: &str) -> Result<bool, AppError> {
        let result = self
            .requests
            .delete_one(doc! { "request_id": request_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn requests_for_retention(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<InvoiceRequest>, AppError> {
        let filter = doc! {
            "created_at": { "$lt": BsonDateTime::from_chrono(cutoff) },
        };
        let cursor = self.requests.find(filter, None).await?;
        let requests: Vec<InvoiceRequest> = cursor.try_collect().await?;
        Ok(requests)
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        self.invoices
            .insert_one(invoice, None)
            .await
            .map_err(|e| map_insert_err(e, "invoice"))?;
        Ok(())
    }

    async fn count_invoices(&self) -> Result<u64, AppError> {
        let count = self.invoices.count_documents(doc! {}, None).await?;
        Ok(count)
    }

    async fn insert_collection(&self, entry: &CollectionEntry) -> Result<(), AppError> {
        self.collections
            .insert_one(entry, None)
            .await
            .map_err(|e| map_insert_err(e, "collection entry"))?;
        Ok(())
    }

    async fn get_collection_for_request(
        &self,
        request_id: &str,
    ) -> Result<Option<CollectionEntry>, AppError> {
        let entry = self
            .collections
            .find_one(doc! { "invoice_request_id": request_id }, None)
            .await?;
        Ok(entry)
    }

    async fn upsert_assignment(&self, assignment: &DeliveryAssignment) -> Result<(), AppError> {
        let payment_qr = match &assignment.payment_qr {
            Some(qr) => {
                mongodb::bson::to_bson(qr).map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?
            }
            None => Bson::Null,
        };
        let filter = doc! { "invoice_request_id": &assignment.invoice_request_id };
        let update = doc! {
            "$set": {
                "tracking_code": &assignment.tracking_code,
                "receiver_name": &assignment.receiver_name,
                "receiver_phone": &assignment.receiver_phone,
                "delivery_address": &assignment.delivery_address,
                "amount": assignment.amount,
                "currency": &assignment.currency,
                "payment_qr": payment_qr,
                "updated_at": BsonDateTime::now(),
            },
            "$setOnInsert": {
                "assignment_id": &assignment.assignment_id,
                "status": assignment.status.as_str(),
                "created_at": BsonDateTime::from_chrono(assignment.created_at),
            }
        };
        let options = UpdateOptions::builder().upsert(true).build();
        self.assignments
            .update_one(filter, update, options)
            .await?;
        Ok(())
    }

    async fn get_assignment_for_request(
        &self,
        request_id: &str,
    ) -> Result<Option<DeliveryAssignment>, AppError> {
        let assignment = self
            .assignments
            .find_one(doc! { "invoice_request_id": request_id }, None)
            .await?;
        Ok(assignment)
    }

    async fn delete_assignment(&self, assignment_id: &str) -> Result<bool, AppError> {
        let result = self
            .assignments
            .delete_one(doc! { "assignment_id": assignment_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn assignments_for_retention(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DeliveryAssignment>, AppError> {
        let filter = doc! {
            "created_at": { "$lt": BsonDateTime::from_chrono(cutoff) },
        };
        let cursor = self.assignments.find(filter, None).await?;
        let assignments: Vec<DeliveryAssignment> = cursor.try_collect().await?;
        Ok(assignments)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
