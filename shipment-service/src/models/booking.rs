use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    NotReviewed,
    Reviewed,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::NotReviewed => "not_reviewed",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "not_reviewed" => Some(ReviewStatus::NotReviewed),
            "reviewed" => Some(ReviewStatus::Reviewed),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// ISO 3166-1 alpha-2, e.g. "PH" or "AE".
    pub country_code: String,
}

impl Address {
    /// Single-line rendering used for delivery assignments and carrier payloads.
    pub fn formatted(&self) -> String {
        let mut parts = vec![self.line1.clone()];
        if let Some(line2) = &self.line2 {
            parts.push(line2.clone());
        }
        parts.push(self.city.clone());
        if let Some(state) = &self.state {
            parts.push(state.clone());
        }
        if let Some(postal) = &self.postal_code {
            parts.push(postal.clone());
        }
        parts.push(self.country_code.clone());
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimensions {
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingItem {
    pub commodity: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityDocument {
    pub doc_type: String,
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
}

/// Customer-submitted shipment intent. Reviewed exactly once; owns at most
/// one invoice request via `converted_to_invoice_request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub booking_id: String,
    /// Route as submitted by the customer, e.g. "ph-to-uae". Resolved to a
    /// service code at the API boundary, never stored normalized.
    pub service: String,
    pub sender: ContactInfo,
    pub receiver: ContactInfo,
    pub items: Vec<BookingItem>,
    #[serde(default)]
    pub insured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_amount: Option<f64>,
    /// Tracking number pre-assigned at intake, reused at conversion when
    /// still unclaimed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awb: Option<String>,
    /// Intake verification code, retained as audit data until the booking
    /// itself is deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    #[serde(default)]
    pub identity_documents: Vec<IdentityDocument>,
    pub review_status: ReviewStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::opt_chrono_datetime_as_bson_datetime"
    )]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_to_invoice_request_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: String,
        sender: ContactInfo,
        receiver: ContactInfo,
        items: Vec<BookingItem>,
        insured: bool,
        declared_amount: Option<f64>,
        awb: Option<String>,
        otp: Option<String>,
        identity_documents: Vec<IdentityDocument>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            booking_id: uuid::Uuid::new_v4().to_string(),
            service,
            sender,
            receiver,
            items,
            insured,
            declared_amount,
            awb,
            otp,
            identity_documents,
            review_status: ReviewStatus::NotReviewed,
            reviewed_at: None,
            reviewed_by: None,
            converted_to_invoice_request_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_reviewed(&mut self, status: ReviewStatus, reviewed_by: &str) {
        self.review_status = status;
        self.reviewed_at = Some(Utc::now());
        self.reviewed_by = Some(reviewed_by.to_string());
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> BookingSnapshot {
        BookingSnapshot {
            booking_id: self.booking_id.clone(),
            service: self.service.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            items: self.items.clone(),
            insured: self.insured,
            declared_amount: self.declared_amount,
            created_at: self.created_at,
        }
    }
}

/// Immutable copy of the source booking embedded into the invoice request.
/// Identity documents and the intake OTP are deliberately not carried over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub booking_id: String,
    pub service: String,
    pub sender: ContactInfo,
    pub receiver: ContactInfo,
    pub items: Vec<BookingItem>,
    #[serde(default)]
    pub insured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contact(country: &str) -> ContactInfo {
        ContactInfo {
            name: "Maria Santos".to_string(),
            phone: "+639170000001".to_string(),
            email: None,
            address: Address {
                line1: "12 Rizal St".to_string(),
                line2: None,
                city: "Manila".to_string(),
                state: None,
                postal_code: Some("1000".to_string()),
                country_code: country.to_string(),
            },
        }
    }

    #[test]
    fn snapshot_strips_identity_documents_and_otp() {
        let mut booking = Booking::new(
            "ph-to-uae".to_string(),
            sample_contact("PH"),
            sample_contact("AE"),
            vec![BookingItem {
                commodity: "Electronics".to_string(),
                quantity: 1,
                weight_kg: Some(10.0),
                dimensions: None,
            }],
            false,
            None,
            None,
            Some("482913".to_string()),
            vec![IdentityDocument {
                doc_type: "passport".to_string(),
                number: "P1234567".to_string(),
                file_key: None,
            }],
        );
        booking.mark_reviewed(ReviewStatus::Reviewed, "ops@example.com");

        let snapshot = booking.snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("identity_documents").is_none());
        assert!(json.get("otp").is_none());
        assert_eq!(json["booking_id"], booking.booking_id);
    }

    #[test]
    fn review_status_round_trips() {
        for status in [
            ReviewStatus::NotReviewed,
            ReviewStatus::Reviewed,
            ReviewStatus::Rejected,
        ] {
            assert_eq!(ReviewStatus::from_string(status.as_str()), Some(status));
        }
        assert_eq!(ReviewStatus::from_string("bogus"), None);
    }

    #[test]
    fn formatted_address_joins_present_parts() {
        let contact = sample_contact("PH");
        let formatted = contact.address.formatted();
        assert_eq!(formatted, "12 Rizal St, Manila, 1000, PH");
    }
}
