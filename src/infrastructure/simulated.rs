//! In-process stand-ins for the platform store and the game server.
//!
//! Both platform variants share one [`SimulatedPlatform`], whose [`Ledger`]
//! can be written to disk so a purchase left unconsumed by one process is
//! still visible to the next. Outcomes are scripted per call; an empty
//! script means success.

use crate::domain::api::{ApiContext, ApiKind, ExternalApi};
use crate::domain::ports::PurchaseGateway;
use crate::domain::purchase::{GatewayKind, Inventory, Purchase, PurchaseOutcome, SkuInfo};
use crate::error::{
    ApiError, ConsumeError, GatewayError, ITEM_ALREADY_OWNED_CODE, Result, USER_CANCELLED_CODE,
};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// An item handed out by the grant API.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Grant {
    pub product_id: String,
    pub transaction_id: Option<String>,
    pub quantity: u32,
}

/// Platform-side and server-side state of the simulation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Ledger {
    #[serde(default)]
    pub unconsumed: Vec<Purchase>,
    #[serde(default)]
    pub consumed: Vec<Purchase>,
    #[serde(default)]
    pub granted: Vec<Grant>,
    #[serde(default)]
    next_sequence: u64,
}

impl Ledger {
    /// Reads a ledger file; a missing file is an empty ledger.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_sequence += 1;
        format!("{prefix}-{}", self.next_sequence)
    }
}

/// Scripted answer to the next purchase request.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseScript {
    Succeed,
    Fail { code: i32, message: String },
    Cancel,
    AwaitVerification,
}

/// Scripted answer to the next consume request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeScript {
    Succeed,
    Fail(String),
}

/// Shared state behind both simulated gateways and the simulated server APIs.
#[derive(Clone)]
pub struct SimulatedPlatform {
    ledger: Arc<RwLock<Ledger>>,
    catalog: Arc<Vec<SkuInfo>>,
    authorized: Arc<AtomicBool>,
    purchase_script: Arc<Mutex<VecDeque<PurchaseScript>>>,
    consume_script: Arc<Mutex<VecDeque<ConsumeScript>>>,
    purchase_calls: Arc<AtomicUsize>,
}

impl SimulatedPlatform {
    pub fn new(catalog: Vec<SkuInfo>) -> Self {
        Self::with_ledger(catalog, Ledger::default())
    }

    pub fn with_ledger(catalog: Vec<SkuInfo>, ledger: Ledger) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            catalog: Arc::new(catalog),
            authorized: Arc::new(AtomicBool::new(true)),
            purchase_script: Arc::new(Mutex::new(VecDeque::new())),
            consume_script: Arc::new(Mutex::new(VecDeque::new())),
            purchase_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Three consumable gem packs.
    pub fn default_catalog() -> Vec<SkuInfo> {
        vec![
            SkuInfo {
                product_id: "sku-1".to_string(),
                title: "Gem x10".to_string(),
                price: dec!(0.99),
                currency: "USD".to_string(),
            },
            SkuInfo {
                product_id: "sku-2".to_string(),
                title: "Gem x60".to_string(),
                price: dec!(4.99),
                currency: "USD".to_string(),
            },
            SkuInfo {
                product_id: "sku-3".to_string(),
                title: "Gem x130".to_string(),
                price: dec!(9.99),
                currency: "USD".to_string(),
            },
        ]
    }

    pub fn catalog_ids(&self) -> Vec<String> {
        self.catalog.iter().map(|s| s.product_id.clone()).collect()
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    pub async fn script_purchase(&self, script: PurchaseScript) {
        self.purchase_script.lock().await.push_back(script);
    }

    pub async fn script_consume(&self, script: ConsumeScript) {
        self.consume_script.lock().await.push_back(script);
    }

    /// Number of purchase requests received so far.
    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    pub async fn ledger(&self) -> Ledger {
        self.ledger.read().await.clone()
    }

    /// Records a purchase the store holds but nobody consumed, as if a previous
    /// process had died right after paying.
    pub async fn seed_unconsumed(&self, product_id: &str) -> Purchase {
        let mut ledger = self.ledger.write().await;
        let purchase = token_purchase(&mut ledger, product_id);
        ledger.unconsumed.push(purchase.clone());
        purchase
    }

    fn authorize(&self) -> std::result::Result<(), GatewayError> {
        if self.authorized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::NotAuthorized(
                "payments are disabled on this device".to_string(),
            ))
        }
    }

    fn knows(&self, product_id: &str) -> bool {
        self.catalog.iter().any(|s| s.product_id == product_id)
    }

    fn skus(&self, product_ids: &[String]) -> Vec<SkuInfo> {
        self.catalog
            .iter()
            .filter(|s| product_ids.contains(&s.product_id))
            .cloned()
            .collect()
    }

    async fn next_purchase_script(&self) -> PurchaseScript {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        self.purchase_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(PurchaseScript::Succeed)
    }

    async fn next_consume_script(&self) -> ConsumeScript {
        self.consume_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ConsumeScript::Succeed)
    }
}

fn token_purchase(ledger: &mut Ledger, product_id: &str) -> Purchase {
    let order_id = ledger.next_id("order");
    let token = format!("token-{order_id}");
    let mut purchase = Purchase::with_token(product_id, &order_id, &token, format!("sig-{order_id}"));
    purchase.original_json = Some(
        serde_json::json!({
            "orderId": order_id,
            "productId": product_id,
            "purchaseToken": token,
        })
        .to_string(),
    );
    purchase
}

fn unknown_product(product_id: &str) -> GatewayError {
    GatewayError::rejected(format!("unknown product {product_id}"), Some(4))
}

/// Receipt-based store: no consume, no inventory.
#[derive(Clone)]
pub struct SimulatedReceiptGateway {
    platform: SimulatedPlatform,
}

impl SimulatedReceiptGateway {
    pub fn new(platform: SimulatedPlatform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl PurchaseGateway for SimulatedReceiptGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Receipt
    }

    async fn authorize(&self) -> std::result::Result<(), GatewayError> {
        self.platform.authorize()
    }

    async fn purchase(&self, product_id: &str, quantity: u32) -> PurchaseOutcome {
        let script = self.platform.next_purchase_script().await;
        if !self.platform.knows(product_id) {
            return PurchaseOutcome::Failed(unknown_product(product_id));
        }
        match script {
            PurchaseScript::Succeed => {
                let mut ledger = self.platform.ledger.write().await;
                let order_id = ledger.next_id("order");
                let receipt = format!("receipt:{order_id}:{product_id}:{quantity}");
                PurchaseOutcome::Succeeded(Purchase::with_receipt(product_id, order_id, receipt))
            }
            PurchaseScript::Fail { code, message } => {
                PurchaseOutcome::Failed(GatewayError::rejected(message, Some(code)))
            }
            PurchaseScript::Cancel => PurchaseOutcome::Cancelled(GatewayError::rejected(
                "purchase cancelled",
                Some(USER_CANCELLED_CODE),
            )),
            PurchaseScript::AwaitVerification => {
                let mut ledger = self.platform.ledger.write().await;
                let order_id = ledger.next_id("order");
                PurchaseOutcome::AwaitingVerification {
                    purchase_data: format!("receipt:{order_id}:{product_id}:{quantity}"),
                    signature: String::new(),
                }
            }
        }
    }

    async fn request_products(
        &self,
        product_ids: &[String],
    ) -> std::result::Result<Vec<SkuInfo>, GatewayError> {
        Ok(self.platform.skus(product_ids))
    }
}

/// Token-based store: purchases stay owned until consumed.
#[derive(Clone)]
pub struct SimulatedTokenGateway {
    platform: SimulatedPlatform,
}

impl SimulatedTokenGateway {
    pub fn new(platform: SimulatedPlatform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl PurchaseGateway for SimulatedTokenGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Token
    }

    async fn authorize(&self) -> std::result::Result<(), GatewayError> {
        self.platform.authorize()
    }

    async fn purchase(&self, product_id: &str, _quantity: u32) -> PurchaseOutcome {
        let script = self.platform.next_purchase_script().await;
        if !self.platform.knows(product_id) {
            return PurchaseOutcome::Failed(unknown_product(product_id));
        }

        let mut ledger = self.platform.ledger.write().await;
        if ledger.unconsumed.iter().any(|p| p.product_id == product_id) {
            return PurchaseOutcome::Failed(GatewayError::rejected(
                "item already owned",
                Some(ITEM_ALREADY_OWNED_CODE),
            ));
        }

        match script {
            PurchaseScript::Succeed => {
                let purchase = token_purchase(&mut ledger, product_id);
                ledger.unconsumed.push(purchase.clone());
                PurchaseOutcome::Succeeded(purchase)
            }
            PurchaseScript::Fail { code, message } => {
                PurchaseOutcome::Failed(GatewayError::rejected(message, Some(code)))
            }
            PurchaseScript::Cancel => PurchaseOutcome::Failed(GatewayError::rejected(
                "user cancelled",
                Some(USER_CANCELLED_CODE),
            )),
            PurchaseScript::AwaitVerification => {
                let purchase = token_purchase(&mut ledger, product_id);
                ledger.unconsumed.push(purchase.clone());
                PurchaseOutcome::AwaitingVerification {
                    purchase_data: purchase.original_json.unwrap_or_default(),
                    signature: purchase.signature.unwrap_or_default(),
                }
            }
        }
    }

    async fn consume(&self, product_id: &str) -> std::result::Result<Purchase, ConsumeError> {
        if let ConsumeScript::Fail(message) = self.platform.next_consume_script().await {
            return Err(GatewayError::rejected(message, None).into());
        }

        let mut ledger = self.platform.ledger.write().await;
        let position = ledger
            .unconsumed
            .iter()
            .position(|p| p.product_id == product_id)
            .ok_or(ConsumeError::NothingToConsume)?;
        let purchase = ledger.unconsumed.remove(position);
        ledger.consumed.push(purchase.clone());
        Ok(purchase)
    }

    async fn query_inventory(
        &self,
        product_ids: &[String],
    ) -> std::result::Result<Inventory, GatewayError> {
        let ledger = self.platform.ledger.read().await;
        Ok(Inventory {
            purchases: ledger
                .unconsumed
                .iter()
                .filter(|p| product_ids.contains(&p.product_id))
                .cloned()
                .collect(),
            skus: self.platform.skus(product_ids),
        })
    }

    async fn request_products(
        &self,
        product_ids: &[String],
    ) -> std::result::Result<Vec<SkuInfo>, GatewayError> {
        Ok(self.platform.skus(product_ids))
    }
}

/// Game-server start and grant endpoints backed by the ledger.
pub struct SimulatedServerApi {
    kind: ApiKind,
    platform: SimulatedPlatform,
    latency: Duration,
    failure: Option<String>,
}

impl SimulatedServerApi {
    pub fn new(kind: ApiKind, platform: SimulatedPlatform) -> Self {
        Self {
            kind,
            platform,
            latency: Duration::from_millis(5),
            failure: None,
        }
    }

    /// Makes every call report `message` as a server error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl ExternalApi for SimulatedServerApi {
    async fn call(&self, ctx: ApiContext) -> std::result::Result<(), ApiError> {
        ctx.progress.response_wait()?;
        tokio::time::sleep(self.latency).await;

        if let Some(message) = &self.failure {
            return Err(ApiError::remote(message.clone()));
        }

        let mut ledger = self.platform.ledger.write().await;
        match self.kind {
            ApiKind::Start => {
                let transaction_id = ledger.next_id("txn");
                debug!(%transaction_id, product_id = %ctx.product_id, "server issued transaction");
                ctx.progress.finish_with_transaction(transaction_id)
            }
            ApiKind::Grant => {
                ledger.granted.push(Grant {
                    product_id: ctx.product_id.clone(),
                    transaction_id: ctx.transaction_id.clone(),
                    quantity: ctx.quantity,
                });
                debug!(product_id = %ctx.product_id, "server granted item");
                ctx.progress.finish()
            }
        }
    }
}
