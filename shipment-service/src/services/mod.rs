pub mod cache;
pub mod carrier;
pub mod identifiers;
pub mod lifecycle;
pub mod metrics;
pub mod qr;
pub mod rules;
pub mod store;
pub mod sync;

pub use cache::ResponseCache;
pub use carrier::{CarrierApi, EmpostClient, MockCarrier};
pub use lifecycle::LifecycleService;
pub use metrics::{get_metrics, init_metrics};
pub use qr::PaymentQrService;
pub use store::{MemoryStore, MongoStore, ShipmentStore};
pub use sync::CarrierSync;
