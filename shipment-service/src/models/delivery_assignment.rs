use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Assigned,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Completed => "completed",
        }
    }
}

/// Payment handle attached to a delivery assignment: a link plus its QR
/// rendering, valid for a bounded window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentQr {
    pub link: String,
    pub qr_png_base64: String,
    pub expires_at: DateTime<Utc>,
}

/// Created or refreshed when finance completes an invoice request. Keyed
/// by `invoice_request_id`; repeated completions refresh the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAssignment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub assignment_id: String,
    pub invoice_request_id: String,
    pub tracking_code: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub delivery_address: String,
    pub amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_qr: Option<PaymentQr>,
    pub status: AssignmentStatus,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAssignment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoice_request_id: String,
        tracking_code: String,
        receiver_name: String,
        receiver_phone: String,
        delivery_address: String,
        amount: f64,
        currency: String,
        payment_qr: Option<PaymentQr>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            assignment_id: uuid::Uuid::new_v4().to_string(),
            invoice_request_id,
            tracking_code,
            receiver_name,
            receiver_phone,
            delivery_address,
            amount,
            currency,
            payment_qr,
            status: AssignmentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
