//! Fire-and-forget dispatch of carrier calls. The lifecycle engine never
//! awaits these tasks; a carrier failure is logged and counted, and the
//! local transition stands.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::carrier::{CarrierApi, StatusUpdate};
use super::store::ShipmentStore;
use crate::models::InvoiceRequest;

#[derive(Clone)]
pub struct CarrierSync {
    api: Arc<dyn CarrierApi>,
    store: Arc<dyn ShipmentStore>,
    call_timeout: Duration,
}

impl CarrierSync {
    pub fn new(api: Arc<dyn CarrierApi>, store: Arc<dyn ShipmentStore>, call_timeout: Duration) -> Self {
        Self {
            api,
            store,
            call_timeout,
        }
    }

    /// Register the shipment with the carrier in the background. Skips
    /// silently when the integration is disabled or the request already
    /// carries a carrier reference.
    pub fn spawn_create(&self, request: &InvoiceRequest) {
        if !self.api.is_enabled() {
            tracing::debug!(
                tracking_code = %request.tracking_code,
                "carrier integration disabled, skipping shipment creation"
            );
            return;
        }
        if request.empost_uhawb.is_some() {
            return;
        }

        metrics::counter!("carrier_sync_total", "call" => "create").increment(1);

        let api = self.api.clone();
        let store = self.store.clone();
        let call_timeout = self.call_timeout;
        let request = request.clone();
        tokio::spawn(async move {
            match timeout(call_timeout, api.create_shipment(&request)).await {
                Ok(Ok(uhawb)) => {
                    match store
                        .set_carrier_ref_if_absent(&request.request_id, &uhawb)
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            // A concurrent create won; the first stored
                            // reference stays.
                            tracing::debug!(
                                request_id = %request.request_id,
                                uhawb = %uhawb,
                                "carrier reference already present"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                request_id = %request.request_id,
                                error = %e,
                                "failed to store carrier reference"
                            );
                            metrics::counter!("carrier_sync_failures_total", "call" => "create")
                                .increment(1);
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        request_id = %request.request_id,
                        tracking_code = %request.tracking_code,
                        error = %e,
                        "carrier shipment creation failed"
                    );
                    metrics::counter!("carrier_sync_failures_total", "call" => "create")
                        .increment(1);
                }
                Err(_) => {
                    tracing::error!(
                        request_id = %request.request_id,
                        tracking_code = %request.tracking_code,
                        timeout_secs = call_timeout.as_secs(),
                        "carrier shipment creation timed out"
                    );
                    metrics::counter!("carrier_sync_failures_total", "call" => "create")
                        .increment(1);
                }
            }
        });
    }

    /// Push a status change to the carrier in the background.
    pub fn spawn_status_push(&self, update: StatusUpdate) {
        if !self.api.is_enabled() {
            return;
        }

        metrics::counter!("carrier_sync_total", "call" => "status").increment(1);

        let api = self.api.clone();
        let call_timeout = self.call_timeout;
        tokio::spawn(async move {
            match timeout(call_timeout, api.push_status(&update)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(
                        tracking_code = %update.tracking_code,
                        status = %update.status,
                        error = %e,
                        "carrier status push failed"
                    );
                    metrics::counter!("carrier_sync_failures_total", "call" => "status")
                        .increment(1);
                }
                Err(_) => {
                    tracing::error!(
                        tracking_code = %update.tracking_code,
                        status = %update.status,
                        timeout_secs = call_timeout.as_secs(),
                        "carrier status push timed out"
                    );
                    metrics::counter!("carrier_sync_failures_total", "call" => "status")
                        .increment(1);
                }
            }
        });
    }
}
