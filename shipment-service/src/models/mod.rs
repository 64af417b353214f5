pub mod booking;
pub mod collection;
pub mod delivery_assignment;
pub mod invoice;
pub mod invoice_request;

pub use booking::{
    Address, Booking, BookingItem, BookingSnapshot, ContactInfo, Dimensions, IdentityDocument,
    ReviewStatus,
};
pub use collection::{CollectionEntry, CollectionStatus};
pub use delivery_assignment::{AssignmentStatus, DeliveryAssignment, PaymentQr};
pub use invoice::Invoice;
pub use invoice_request::{
    BoxEntry, Classification, DeliveryStatus, InvoiceRequest, InvoiceStatus, ServiceCode,
    ShipmentType, Verification, WeightType,
};

// Helper module for optional DateTime<Utc> as BSON DateTime
pub(crate) mod opt_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(dt) => {
                let bson_dt = bson::DateTime::from_chrono(*dt);
                bson_dt.serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt.map(|dt| dt.to_chrono()))
    }
}
