use crate::application::reconciler::{InventoryReconciler, InventoryScope, Reconciliation};
use crate::config::BillingConfig;
use crate::domain::api::{ApiContext, ApiKind, ApiProgress, PurchaseApis};
use crate::domain::ports::{BillingEventsRef, PurchaseGatewayBox, TransactionStoreBox};
use crate::domain::purchase::{GatewayKind, Inventory, Purchase, PurchaseOutcome};
use crate::domain::transaction::{TransactionRecord, TransactionState};
use crate::error::{ApiError, BillingError, ConsumeError, GatewayError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal step reached by one orchestrator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    Unauthorized,
    /// Start API done, purchase left to the caller (auto-purchase off).
    AwaitingPurchase,
    /// Purchase confirmed, grant left to the caller (auto-purchase off).
    Purchased,
    Cancelled,
    PurchaseFailed,
    AwaitingVerification,
    ApiFailed(ApiKind),
    /// Item granted; on token platforms the consume is left to the caller.
    Granted,
    Consumed,
    /// Consume found nothing to acknowledge; the record was cleared.
    AlreadyConsumed,
    ConsumeFailed,
    InventoryReceived,
    InventoryQueryFailed,
    NothingToResume,
    ProductsReceived,
    ProductListFailed,
}

/// What the orchestrator remembers while the process runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub target_product_id: Option<String>,
    pub quantity: u32,
    pub auto_purchase: bool,
    pub transaction_id: Option<String>,
}

/// Drives one purchase at a time through start, purchase, grant and consume.
///
/// The orchestrator owns the single pending [`TransactionRecord`]: it is the
/// only writer, and it writes only between suspension points. A record found
/// at session start means an earlier process died mid-flow; [`recover`]
/// resolves it with live inventory evidence instead of retrying inline.
///
/// [`recover`]: BillingOrchestrator::recover
pub struct BillingOrchestrator {
    gateway: PurchaseGatewayBox,
    store: TransactionStoreBox,
    apis: PurchaseApis,
    events: BillingEventsRef,
    config: BillingConfig,
    session: Session,
}

impl BillingOrchestrator {
    /// Creates a new `BillingOrchestrator` instance.
    ///
    /// # Arguments
    ///
    /// * `gateway` - The platform purchase library, chosen at startup.
    /// * `store` - Durable storage for the pending transaction.
    /// * `apis` - The caller's start and grant APIs.
    /// * `events` - Handlers notified of every externally visible step.
    /// * `config` - Catalog and timeout policy.
    pub fn new(
        gateway: PurchaseGatewayBox,
        store: TransactionStoreBox,
        apis: PurchaseApis,
        events: BillingEventsRef,
        config: BillingConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            apis,
            events,
            config,
            session: Session::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn gateway_kind(&self) -> GatewayKind {
        self.gateway.kind()
    }

    pub fn set_product_catalog(&mut self, product_ids: Vec<String>) {
        self.config.product_catalog = product_ids;
    }

    pub async fn pending_transaction(&self) -> Result<Option<TransactionRecord>> {
        self.store.load().await
    }

    /// Buys `product_id` end to end: start API, purchase, grant, consume.
    ///
    /// Fails with [`BillingError::TransactionPending`] when an earlier
    /// transaction is still stored; run [`recover`](Self::recover) first.
    pub async fn purchase_auto(&mut self, product_id: &str, quantity: u32) -> Result<FlowOutcome> {
        if let Err(reason) = self.authorize().await {
            warn!(product_id, %reason, "purchase refused: billing not authorized");
            self.events.on_unauthorized(&reason);
            return Ok(FlowOutcome::Unauthorized);
        }
        if let Some(record) = self.store.load().await? {
            return Err(BillingError::TransactionPending {
                product_id: record.product_id,
                state: record.state,
            });
        }

        self.begin_session(product_id, quantity, true);
        self.execute_start_purchase_api().await
    }

    /// Session-start entry: finishes an interrupted transaction if one is
    /// stored, otherwise starts a fresh purchase of `product_id`.
    pub async fn recover(&mut self, product_id: &str, quantity: u32) -> Result<FlowOutcome> {
        if let Err(reason) = self.authorize().await {
            warn!(product_id, %reason, "recovery refused: billing not authorized");
            self.events.on_unauthorized(&reason);
            return Ok(FlowOutcome::Unauthorized);
        }
        self.events.on_billing_supported();
        self.begin_session(product_id, quantity, true);

        let Some(record) = self.store.load().await? else {
            info!(product_id, "no interrupted transaction; starting a new purchase");
            return self.execute_start_purchase_api().await;
        };

        info!(
            product_id = %record.product_id,
            transaction_id = %record.transaction_id,
            stage = ?record.state,
            "resuming interrupted transaction"
        );
        self.session.target_product_id = Some(record.product_id.clone());
        self.session.quantity = record.quantity;
        self.session.transaction_id = Some(record.transaction_id.clone()).filter(|id| !id.is_empty());

        // Without an inventory query nothing can confirm an unfinished purchase;
        // the platform redelivers paid receipts on its own.
        if record.state == TransactionState::PurchaseStart && !self.gateway.capabilities().inventory {
            info!(
                product_id = %record.product_id,
                "platform cannot confirm the purchase; clearing unconfirmed transaction"
            );
            self.store.delete().await?;
            self.events.on_nothing_to_resume();
            return Ok(FlowOutcome::NothingToResume);
        }

        match InventoryScope::for_record(&record, &self.config.product_catalog) {
            Some(scope) => self.query_inventory(&scope.product_ids()).await,
            None => self.execute_grant_item_api().await,
        }
    }

    /// Runs the start API to `End`, records `PurchaseStart`, then purchases
    /// when auto-purchase is on.
    pub async fn execute_start_purchase_api(&mut self) -> Result<FlowOutcome> {
        let product_id = self.target_product()?;
        let transaction_id = match self.drive_api(ApiKind::Start).await {
            Ok(id) => id,
            Err(err) => return Ok(self.api_failed(ApiKind::Start, &err)),
        };

        let record = TransactionRecord::new(
            &product_id,
            transaction_id.clone().unwrap_or_default(),
            TransactionState::PurchaseStart,
        )
        .with_quantity(self.session.quantity);
        self.store.save(record).await?;
        self.session.transaction_id = transaction_id;
        info!(
            %product_id,
            transaction_id = ?self.session.transaction_id,
            stage = ?TransactionState::PurchaseStart,
            "transaction recorded"
        );

        if self.session.auto_purchase {
            self.throw_purchase_request().await
        } else {
            Ok(FlowOutcome::AwaitingPurchase)
        }
    }

    /// Runs the grant API to `End` and signals `GrantCompleted` once.
    ///
    /// Receipt platforms are done at this point and the record is deleted.
    /// Token platforms keep it as `GrantComplete` until consume succeeds.
    pub async fn execute_grant_item_api(&mut self) -> Result<FlowOutcome> {
        let product_id = self.target_product()?;
        if let Err(err) = self.drive_api(ApiKind::Grant).await {
            return Ok(self.api_failed(ApiKind::Grant, &err));
        }

        let consume = self.gateway.capabilities().consume;
        match self.store.load().await? {
            Some(record) if !self.owns(&record) => {
                debug!(pending = %record.product_id, "pending transaction belongs to another product; left untouched");
            }
            Some(_) if consume => {
                self.advance_record(TransactionState::GrantComplete).await?;
            }
            Some(_) => self.store.delete().await?,
            None if consume => {
                let record = TransactionRecord::new(
                    &product_id,
                    self.session.transaction_id.clone().unwrap_or_default(),
                    TransactionState::GrantComplete,
                )
                .with_quantity(self.session.quantity);
                self.store.save(record).await?;
            }
            None => {}
        }
        info!(%product_id, "item granted");
        self.events.on_grant_completed();

        if consume && self.session.auto_purchase {
            self.send_consume_request().await
        } else {
            Ok(FlowOutcome::Granted)
        }
    }

    /// Reacts to the platform's answer to a purchase request.
    ///
    /// User cancellations end the flow silently: no callback, no record change.
    /// Manual purchases never touch the stored record.
    pub async fn handle_purchase_outcome(&mut self, outcome: PurchaseOutcome) -> Result<FlowOutcome> {
        match outcome {
            PurchaseOutcome::Succeeded(purchase) => {
                if self.session.auto_purchase {
                    self.advance_record(TransactionState::PurchaseComplete).await?;
                }
                info!(
                    product_id = %purchase.product_id,
                    order_id = %purchase.order_id,
                    "purchase confirmed"
                );
                self.events.on_purchase_succeeded(&purchase);

                if self.session.auto_purchase {
                    self.execute_grant_item_api().await
                } else {
                    Ok(FlowOutcome::Purchased)
                }
            }
            PurchaseOutcome::Failed(err) if err.is_user_cancelled() => {
                info!(%err, "purchase cancelled by user");
                Ok(FlowOutcome::Cancelled)
            }
            PurchaseOutcome::Cancelled(err) => {
                info!(%err, "purchase cancelled by user");
                Ok(FlowOutcome::Cancelled)
            }
            PurchaseOutcome::Failed(err) => {
                warn!(%err, code = ?err.code(), "purchase failed");
                self.events.on_purchase_failed(&err);
                Ok(FlowOutcome::PurchaseFailed)
            }
            PurchaseOutcome::AwaitingVerification {
                purchase_data,
                signature,
            } => {
                info!("purchase awaiting verification; left for the next session");
                self.events
                    .on_purchase_awaiting_verification(&purchase_data, &signature);
                Ok(FlowOutcome::AwaitingVerification)
            }
        }
    }

    /// Reacts to the platform's answer to a consume request.
    pub async fn handle_consume_result(
        &mut self,
        result: std::result::Result<Purchase, ConsumeError>,
    ) -> Result<FlowOutcome> {
        match result {
            Ok(purchase) => {
                self.events.on_consume_succeeded(&purchase);
                self.clear_owned_record().await?;
                info!(product_id = %purchase.product_id, "purchase consumed; transaction closed");
                Ok(FlowOutcome::Consumed)
            }
            Err(ConsumeError::NothingToConsume) => {
                info!("nothing left to consume; clearing transaction");
                self.clear_owned_record().await?;
                Ok(FlowOutcome::AlreadyConsumed)
            }
            Err(ConsumeError::Gateway(err)) => {
                warn!(%err, "consume failed; transaction kept for the next session");
                self.events.on_consume_failed(&err);
                Ok(FlowOutcome::ConsumeFailed)
            }
        }
    }

    /// Asks the platform for unconsumed purchases of `product_ids`. With
    /// auto-purchase on, the answer decides how the stored transaction ends.
    pub async fn query_inventory(&mut self, product_ids: &[String]) -> Result<FlowOutcome> {
        let limit = self.config.gateway_timeout();
        let reconciler = InventoryReconciler::new(self.gateway.as_ref());
        let result = bounded(limit, reconciler.unconsumed(product_ids))
            .await
            .and_then(|r| r);

        match result {
            Ok(inventory) => {
                self.events.on_inventory_received(&inventory);
                if self.session.auto_purchase {
                    self.handle_inventory(inventory).await
                } else {
                    Ok(FlowOutcome::InventoryReceived)
                }
            }
            Err(err) => {
                warn!(%err, "inventory query failed");
                self.events.on_inventory_failed(&err);
                Ok(FlowOutcome::InventoryQueryFailed)
            }
        }
    }

    /// Resumes at the grant API when a purchase is still unconsumed; otherwise
    /// the stored record is stale and gets deleted.
    pub async fn handle_inventory(&mut self, inventory: Inventory) -> Result<FlowOutcome> {
        match InventoryReconciler::decide(&inventory) {
            Reconciliation::Resume { purchase, .. } => {
                info!(
                    product_id = %purchase.product_id,
                    order_id = %purchase.order_id,
                    "unconsumed purchase found; resuming at grant"
                );
                self.session.target_product_id = Some(purchase.product_id);
                self.execute_grant_item_api().await
            }
            Reconciliation::NothingToResume => {
                info!("no unconsumed purchase; clearing stale transaction");
                self.store.delete().await?;
                self.events.on_nothing_to_resume();
                Ok(FlowOutcome::NothingToResume)
            }
        }
    }

    /// Issues a purchase without chaining into grant.
    pub async fn purchase_product(&mut self, product_id: &str, quantity: u32) -> Result<FlowOutcome> {
        self.begin_session(product_id, quantity, false);
        self.throw_purchase_request().await
    }

    /// Sends a consume acknowledgment for `product_id`.
    pub async fn consume_product(&mut self, product_id: &str) -> Result<FlowOutcome> {
        self.session.target_product_id = Some(product_id.to_string());
        self.session.auto_purchase = false;
        self.send_consume_request().await
    }

    /// Fetches store listings for the configured catalog.
    pub async fn request_product_list(&self) -> Result<FlowOutcome> {
        let limit = self.config.gateway_timeout();
        let result = bounded(limit, self.gateway.request_products(&self.config.product_catalog))
            .await
            .and_then(|r| r);

        match result {
            Ok(skus) => {
                debug!(count = skus.len(), "product list received");
                self.events.on_products_received(&skus);
                Ok(FlowOutcome::ProductsReceived)
            }
            Err(err) => {
                warn!(%err, "product list request failed");
                self.events.on_products_failed(&err);
                Ok(FlowOutcome::ProductListFailed)
            }
        }
    }

    async fn authorize(&self) -> std::result::Result<(), GatewayError> {
        bounded(self.config.gateway_timeout(), self.gateway.authorize()).await?
    }

    fn begin_session(&mut self, product_id: &str, quantity: u32, auto_purchase: bool) {
        self.session = Session {
            target_product_id: Some(product_id.to_string()),
            quantity,
            auto_purchase,
            transaction_id: None,
        };
    }

    fn target_product(&self) -> Result<String> {
        self.session
            .target_product_id
            .clone()
            .ok_or(BillingError::NoTargetProduct)
    }

    async fn throw_purchase_request(&mut self) -> Result<FlowOutcome> {
        let product_id = self.target_product()?;
        debug!(%product_id, quantity = self.session.quantity, "issuing platform purchase");

        let outcome = bounded(
            self.config.gateway_timeout(),
            self.gateway.purchase(&product_id, self.session.quantity),
        )
        .await
        .unwrap_or_else(PurchaseOutcome::Failed);
        self.handle_purchase_outcome(outcome).await
    }

    async fn send_consume_request(&mut self) -> Result<FlowOutcome> {
        let product_id = self.target_product()?;
        debug!(%product_id, "sending consume request");

        let result = bounded(self.config.gateway_timeout(), self.gateway.consume(&product_id))
            .await
            .unwrap_or_else(|timed_out| Err(ConsumeError::Gateway(timed_out)));
        self.handle_consume_result(result).await
    }

    /// Whether this session may rewrite or clear `record`. The auto flow owns
    /// the record outright; manual steps only the one for their own product.
    fn owns(&self, record: &TransactionRecord) -> bool {
        self.session.auto_purchase
            || self.session.target_product_id.as_deref() == Some(record.product_id.as_str())
    }

    async fn clear_owned_record(&self) -> Result<()> {
        match self.store.load().await? {
            Some(record) if self.owns(&record) => self.store.delete().await,
            Some(record) => {
                debug!(pending = %record.product_id, "pending transaction belongs to another product; left untouched");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Moves the stored record to `state`, pointing it at the session's product.
    /// Returns `false` when nothing is stored or the record is not this session's.
    async fn advance_record(&self, state: TransactionState) -> Result<bool> {
        let Some(mut record) = self.store.load().await? else {
            return Ok(false);
        };
        if !self.owns(&record) {
            return Ok(false);
        }
        record.advance(state)?;
        if let Some(product_id) = &self.session.target_product_id {
            record.product_id = product_id.clone();
        }
        if let Some(transaction_id) = &self.session.transaction_id {
            record.transaction_id = transaction_id.clone();
        }
        self.store.save(record).await?;
        debug!(stage = ?state, "transaction record advanced");
        Ok(true)
    }

    fn api_failed(&self, api: ApiKind, err: &ApiError) -> FlowOutcome {
        warn!(%api, %err, "external api failed");
        self.events.on_api_failed(api, err);
        FlowOutcome::ApiFailed(api)
    }

    /// Launches the API as its own task and waits for its progress to reach
    /// `End`, for the task to give up, or for the timeout, whichever is first.
    async fn drive_api(&self, api: ApiKind) -> std::result::Result<Option<String>, ApiError> {
        let progress = ApiProgress::new();
        let mut watcher = progress.subscribe();
        let ctx = ApiContext {
            kind: api,
            product_id: self.session.target_product_id.clone().unwrap_or_default(),
            quantity: self.session.quantity,
            transaction_id: self.session.transaction_id.clone(),
            progress: progress.clone(),
        };
        debug!(%api, product_id = %ctx.product_id, "external api launched");

        let callee = self.apis.get(api);
        let mut task = tokio::spawn(async move { callee.call(ctx).await });

        let completion = async {
            tokio::select! {
                biased;
                reached = watcher.wait_for(|s| s.state.is_end()) => reached
                    .map(|snapshot| snapshot.transaction_id.clone())
                    .map_err(|_| ApiError::Aborted {
                        api,
                        reason: "progress channel closed".to_string(),
                    }),
                joined = &mut task => match joined {
                    Ok(Ok(())) => {
                        let snapshot = progress.snapshot();
                        if snapshot.state.is_end() {
                            Ok(snapshot.transaction_id)
                        } else {
                            Err(ApiError::Incomplete { api, state: snapshot.state })
                        }
                    }
                    Ok(Err(err)) => Err(err),
                    Err(join) => Err(ApiError::Aborted { api, reason: join.to_string() }),
                },
            }
        };

        let limit = self.config.api_timeout();
        let waited = tokio::time::timeout(limit, completion).await;
        match waited {
            Ok(result) => result,
            Err(_) => {
                task.abort();
                Err(ApiError::TimedOut {
                    api,
                    timeout: limit,
                })
            }
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = T>,
) -> std::result::Result<T, GatewayError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| GatewayError::TimedOut(limit))
}
