#![allow(dead_code)]

use iap_billing::application::orchestrator::BillingOrchestrator;
use iap_billing::config::BillingConfig;
use iap_billing::domain::api::{ApiKind, PurchaseApis};
use iap_billing::domain::ports::{PurchaseGatewayBox, TransactionStoreBox};
use iap_billing::domain::purchase::GatewayKind;
use iap_billing::infrastructure::simulated::{
    SimulatedPlatform, SimulatedReceiptGateway, SimulatedServerApi, SimulatedTokenGateway,
};
use iap_billing::interfaces::recording::RecordingEvents;
use std::sync::Arc;
use std::time::Duration;

pub fn platform() -> SimulatedPlatform {
    SimulatedPlatform::new(SimulatedPlatform::default_catalog())
}

pub fn gateway(kind: GatewayKind, platform: &SimulatedPlatform) -> PurchaseGatewayBox {
    match kind {
        GatewayKind::Receipt => Box::new(SimulatedReceiptGateway::new(platform.clone())),
        GatewayKind::Token => Box::new(SimulatedTokenGateway::new(platform.clone())),
    }
}

pub fn server_apis(platform: &SimulatedPlatform) -> PurchaseApis {
    PurchaseApis::new(
        Arc::new(SimulatedServerApi::new(ApiKind::Start, platform.clone()).with_latency(Duration::ZERO)),
        Arc::new(SimulatedServerApi::new(ApiKind::Grant, platform.clone()).with_latency(Duration::ZERO)),
    )
}

pub fn config(platform: &SimulatedPlatform) -> BillingConfig {
    BillingConfig {
        product_catalog: platform.catalog_ids(),
        api_timeout_ms: 2_000,
        gateway_timeout_ms: 2_000,
    }
}

/// One "process": an orchestrator over the given store and platform state.
pub fn session(
    kind: GatewayKind,
    platform: &SimulatedPlatform,
    store: TransactionStoreBox,
    apis: PurchaseApis,
) -> (BillingOrchestrator, Arc<RecordingEvents>) {
    let events = Arc::new(RecordingEvents::new());
    let orchestrator = BillingOrchestrator::new(
        gateway(kind, platform),
        store,
        apis,
        events.clone(),
        config(platform),
    );
    (orchestrator, events)
}
