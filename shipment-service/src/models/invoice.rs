use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Financial artifact stamped when finance completes an invoice request.
/// Invoices are permanent records; the retention sweeper has no delete
/// path for this collection and asserts its count after every pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub invoice_number: String,
    pub invoice_request_id: String,
    pub tracking_code: String,
    pub amount: f64,
    pub currency: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub generated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        invoice_number: String,
        invoice_request_id: String,
        tracking_code: String,
        amount: f64,
        currency: String,
    ) -> Self {
        Self {
            id: None,
            invoice_number,
            invoice_request_id,
            tracking_code,
            amount,
            currency,
            generated_at: Utc::now(),
        }
    }
}
