//! service-core: Shared infrastructure for the shipment platform services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
