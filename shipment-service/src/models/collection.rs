use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const COLLECTION_DUE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Outstanding,
    Settled,
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionStatus::Outstanding => write!(f, "outstanding"),
            CollectionStatus::Settled => write!(f, "settled"),
        }
    }
}

/// Outstanding receivable created when an invoice request completes with a
/// positive amount. At most one per invoice request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionEntry {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub collection_id: String,
    pub invoice_request_id: String,
    pub invoice_number: String,
    pub amount: f64,
    pub currency: String,
    pub status: CollectionStatus,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub due_date: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl CollectionEntry {
    pub fn new(
        invoice_request_id: String,
        invoice_number: String,
        amount: f64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            collection_id: uuid::Uuid::new_v4().to_string(),
            invoice_request_id,
            invoice_number,
            amount,
            currency,
            status: CollectionStatus::Outstanding,
            due_date: now + Duration::days(COLLECTION_DUE_DAYS),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_date_is_thirty_days_out() {
        let entry = CollectionEntry::new(
            "req-1".to_string(),
            "INV-000001".to_string(),
            150.0,
            "AED".to_string(),
        );
        let due_in = entry.due_date - entry.created_at;
        assert_eq!(due_in, Duration::days(30));
        assert_eq!(entry.status, CollectionStatus::Outstanding);
    }
}
