use super::api::ApiKind;
use super::purchase::{
    GatewayCapabilities, GatewayKind, Inventory, Purchase, PurchaseOutcome, SkuInfo,
};
use super::transaction::TransactionRecord;
use crate::error::{ApiError, ConsumeError, GatewayError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable storage for the one pending transaction record.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn load(&self) -> Result<Option<TransactionRecord>>;
    /// Overwrites whatever record is stored.
    async fn save(&self, record: TransactionRecord) -> Result<()>;
    /// Clears the record. Clearing an empty store succeeds.
    async fn delete(&self) -> Result<()>;
}

/// Platform purchase library.
#[async_trait]
pub trait PurchaseGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    fn capabilities(&self) -> GatewayCapabilities {
        self.kind().capabilities()
    }

    /// Checks that the device may make payments (token stores initialise here).
    async fn authorize(&self) -> std::result::Result<(), GatewayError>;

    /// Token-based stores ignore `quantity`.
    async fn purchase(&self, product_id: &str, quantity: u32) -> PurchaseOutcome;

    async fn consume(&self, _product_id: &str) -> std::result::Result<Purchase, ConsumeError> {
        Err(GatewayError::Unsupported("consume").into())
    }

    async fn query_inventory(
        &self,
        _product_ids: &[String],
    ) -> std::result::Result<Inventory, GatewayError> {
        Err(GatewayError::Unsupported("inventory query"))
    }

    async fn request_products(
        &self,
        product_ids: &[String],
    ) -> std::result::Result<Vec<SkuInfo>, GatewayError>;
}

/// Named callbacks fired by the orchestrator. Every handler defaults to a no-op.
pub trait BillingEvents: Send + Sync {
    fn on_unauthorized(&self, _reason: &GatewayError) {}
    fn on_billing_supported(&self) {}
    fn on_api_failed(&self, _api: ApiKind, _error: &ApiError) {}
    fn on_purchase_succeeded(&self, _purchase: &Purchase) {}
    fn on_purchase_failed(&self, _error: &GatewayError) {}
    fn on_purchase_awaiting_verification(&self, _purchase_data: &str, _signature: &str) {}
    fn on_grant_completed(&self) {}
    fn on_consume_succeeded(&self, _purchase: &Purchase) {}
    fn on_consume_failed(&self, _error: &GatewayError) {}
    fn on_inventory_received(&self, _inventory: &Inventory) {}
    fn on_inventory_failed(&self, _error: &GatewayError) {}
    fn on_nothing_to_resume(&self) {}
    fn on_products_received(&self, _skus: &[SkuInfo]) {}
    fn on_products_failed(&self, _error: &GatewayError) {}
}

/// Handler set that ignores every event.
pub struct NoopEvents;

impl BillingEvents for NoopEvents {}

pub type TransactionStoreBox = Box<dyn TransactionStore>;
pub type TransactionStoreFactory = Box<dyn Fn() -> TransactionStoreBox + Send + Sync>;
pub type PurchaseGatewayBox = Box<dyn PurchaseGateway>;
pub type BillingEventsRef = Arc<dyn BillingEvents>;
