mod common;

use iap_billing::application::orchestrator::FlowOutcome;
use iap_billing::domain::ports::{TransactionStore, TransactionStoreBox};
use iap_billing::domain::purchase::GatewayKind;
use iap_billing::domain::transaction::{TransactionRecord, TransactionState};
use iap_billing::infrastructure::file::JsonFileTransactionStore;
use iap_billing::infrastructure::in_memory::InMemoryTransactionStore;
use iap_billing::infrastructure::simulated::{
    ConsumeScript, Ledger, PurchaseScript, SimulatedPlatform,
};
use iap_billing::interfaces::recording::Recorded;
use tempfile::tempdir;

fn stored(product_id: &str, state: TransactionState) -> InMemoryTransactionStore {
    InMemoryTransactionStore::with_record(TransactionRecord::new(product_id, "txn-7", state))
}

#[tokio::test]
async fn test_purchase_start_with_unconsumed_resumes_at_grant() {
    let platform = common::platform();
    platform.seed_unconsumed("sku-1").await;
    let store = stored("sku-1", TransactionState::PurchaseStart);
    let (mut orchestrator, events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    let outcome = orchestrator.recover("sku-1", 1).await.unwrap();

    assert_eq!(outcome, FlowOutcome::Consumed);
    // No purchase request is re-issued.
    assert_eq!(platform.purchase_calls(), 0);
    assert_eq!(
        events.names(),
        vec![
            "billing_supported",
            "inventory_received",
            "grant_completed",
            "consume_succeeded"
        ]
    );
    let ledger = platform.ledger().await;
    assert_eq!(ledger.granted.len(), 1);
    assert_eq!(ledger.granted[0].transaction_id.as_deref(), Some("txn-7"));
    assert!(ledger.unconsumed.is_empty());
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_purchase_start_without_unconsumed_is_stale() {
    let platform = common::platform();
    let store = stored("sku-1", TransactionState::PurchaseStart);
    let (mut orchestrator, events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    let outcome = orchestrator.recover("sku-1", 1).await.unwrap();

    assert_eq!(outcome, FlowOutcome::NothingToResume);
    assert_eq!(
        events.names(),
        vec!["billing_supported", "inventory_received", "nothing_to_resume"]
    );
    assert!(store.load().await.unwrap().is_none());
    assert!(platform.ledger().await.granted.is_empty());
    assert_eq!(platform.purchase_calls(), 0);
}

#[tokio::test]
async fn test_purchase_start_scope_covers_whole_catalog() {
    let platform = common::platform();
    // The interrupted purchase was for another catalog product.
    platform.seed_unconsumed("sku-3").await;
    let store = stored("sku-1", TransactionState::PurchaseStart);
    let (mut orchestrator, _events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    assert_eq!(
        orchestrator.recover("sku-1", 1).await.unwrap(),
        FlowOutcome::Consumed
    );
    let ledger = platform.ledger().await;
    assert_eq!(ledger.granted[0].product_id, "sku-3");
    assert_eq!(ledger.consumed[0].product_id, "sku-3");
}

#[tokio::test]
async fn test_several_unconsumed_resumes_first_only() {
    let platform = common::platform();
    platform.seed_unconsumed("sku-2").await;
    platform.seed_unconsumed("sku-3").await;
    let store = stored("sku-1", TransactionState::PurchaseStart);
    let (mut orchestrator, events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store),
        common::server_apis(&platform),
    );

    orchestrator.recover("sku-1", 1).await.unwrap();

    assert_eq!(
        events.events()[1],
        Recorded::InventoryReceived {
            product_ids: vec!["sku-2".to_string(), "sku-3".to_string()]
        }
    );
    let ledger = platform.ledger().await;
    assert_eq!(ledger.granted.len(), 1);
    assert_eq!(ledger.granted[0].product_id, "sku-2");
    assert_eq!(ledger.unconsumed.len(), 1);
    assert_eq!(ledger.unconsumed[0].product_id, "sku-3");
}

#[tokio::test]
async fn test_purchase_complete_goes_straight_to_grant() {
    let platform = common::platform();
    platform.seed_unconsumed("sku-3").await;
    let store = InMemoryTransactionStore::with_record(
        TransactionRecord::new("sku-3", "txn-9", TransactionState::PurchaseComplete)
            .with_quantity(4),
    );
    let (mut orchestrator, events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    // The stored transaction wins over the requested product.
    let outcome = orchestrator.recover("sku-1", 1).await.unwrap();

    assert_eq!(outcome, FlowOutcome::Consumed);
    assert_eq!(
        events.names(),
        vec!["billing_supported", "grant_completed", "consume_succeeded"]
    );
    let grant = &platform.ledger().await.granted[0];
    assert_eq!(grant.product_id, "sku-3");
    assert_eq!(grant.quantity, 4);
    assert_eq!(grant.transaction_id.as_deref(), Some("txn-9"));
    assert_eq!(orchestrator.session().target_product_id.as_deref(), Some("sku-3"));
}

#[tokio::test]
async fn test_grant_complete_without_unconsumed_is_deleted() {
    let platform = common::platform();
    let store = stored("sku-2", TransactionState::GrantComplete);
    let (mut orchestrator, events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    let outcome = orchestrator.recover("sku-2", 1).await.unwrap();

    assert_eq!(outcome, FlowOutcome::NothingToResume);
    assert!(store.load().await.unwrap().is_none());
    assert_eq!(events.count(|e| matches!(e, Recorded::GrantCompleted)), 0);
    assert!(platform.ledger().await.granted.is_empty());
}

#[tokio::test]
async fn test_grant_complete_scope_is_record_product() {
    let platform = common::platform();
    // Unconsumed purchases of other products are not evidence for this record.
    platform.seed_unconsumed("sku-1").await;
    let store = stored("sku-2", TransactionState::GrantComplete);
    let (mut orchestrator, _events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    assert_eq!(
        orchestrator.recover("sku-2", 1).await.unwrap(),
        FlowOutcome::NothingToResume
    );
    assert_eq!(platform.ledger().await.unconsumed.len(), 1);
}

#[tokio::test]
async fn test_receipt_platform_clears_unconfirmed_purchase_start() {
    let platform = common::platform();
    let store = stored("sku-1", TransactionState::PurchaseStart);
    let (mut orchestrator, events) = common::session(
        GatewayKind::Receipt,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    let outcome = orchestrator.recover("sku-1", 1).await.unwrap();

    assert_eq!(outcome, FlowOutcome::NothingToResume);
    assert_eq!(
        events.take(),
        vec![Recorded::BillingSupported, Recorded::NothingToResume]
    );
    assert!(store.load().await.unwrap().is_none());
    assert_eq!(platform.purchase_calls(), 0);

    // A direct inventory query is still refused on this platform.
    let outcome = orchestrator.query_inventory(&["sku-1".to_string()]).await.unwrap();
    assert_eq!(outcome, FlowOutcome::InventoryQueryFailed);
}

#[tokio::test]
async fn test_receipt_purchase_after_cancel_and_recover() {
    let platform = common::platform();
    platform.script_purchase(PurchaseScript::Cancel).await;
    let store = InMemoryTransactionStore::new();
    let (mut orchestrator, events) = common::session(
        GatewayKind::Receipt,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    let outcome = orchestrator.purchase_auto("sku-1", 1).await.unwrap();
    assert_eq!(outcome, FlowOutcome::Cancelled);
    assert_eq!(
        store.load().await.unwrap().unwrap().state,
        TransactionState::PurchaseStart
    );

    let outcome = orchestrator.recover("sku-1", 1).await.unwrap();
    assert_eq!(outcome, FlowOutcome::NothingToResume);

    let outcome = orchestrator.purchase_auto("sku-1", 1).await.unwrap();
    assert_eq!(outcome, FlowOutcome::Granted);
    assert!(store.load().await.unwrap().is_none());
    assert_eq!(platform.ledger().await.granted.len(), 1);
    assert_eq!(
        events.names(),
        vec![
            "billing_supported",
            "nothing_to_resume",
            "purchase_succeeded",
            "grant_completed"
        ]
    );
}

#[tokio::test]
async fn test_receipt_purchase_complete_grants_and_clears() {
    let platform = common::platform();
    let store = stored("sku-2", TransactionState::PurchaseComplete);
    let (mut orchestrator, _events) = common::session(
        GatewayKind::Receipt,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    assert_eq!(
        orchestrator.recover("sku-2", 1).await.unwrap(),
        FlowOutcome::Granted
    );
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_no_record_starts_fresh_purchase() {
    let platform = common::platform();
    let (mut orchestrator, events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(InMemoryTransactionStore::new()),
        common::server_apis(&platform),
    );

    let outcome = orchestrator.recover("sku-1", 1).await.unwrap();

    assert_eq!(outcome, FlowOutcome::Consumed);
    assert_eq!(platform.purchase_calls(), 1);
    assert_eq!(events.names()[0], "billing_supported");
}

#[tokio::test]
async fn test_unauthorized_recovery_touches_nothing() {
    let platform = common::platform();
    platform.set_authorized(false);
    let store = stored("sku-1", TransactionState::PurchaseComplete);
    let (mut orchestrator, events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    let outcome = orchestrator.recover("sku-1", 1).await.unwrap();

    assert_eq!(outcome, FlowOutcome::Unauthorized);
    assert_eq!(events.names(), vec!["unauthorized"]);
    assert!(store.load().await.unwrap().is_some());
}

/// Two processes sharing a state directory: the first dies after the grant
/// (consume rejected), the second finds the purchase already acknowledged.
#[tokio::test]
async fn test_restart_across_processes() {
    let dir = tempdir().unwrap();
    let record_path = dir.path().join("transaction.json");
    let ledger_path = dir.path().join("ledger.json");

    {
        let platform = common::platform();
        platform
            .script_consume(ConsumeScript::Fail("store unavailable".to_string()))
            .await;
        let store: TransactionStoreBox = Box::new(JsonFileTransactionStore::open(&record_path).unwrap());
        let (mut orchestrator, _events) =
            common::session(GatewayKind::Token, &platform, store, common::server_apis(&platform));

        assert_eq!(
            orchestrator.purchase_auto("sku-2", 1).await.unwrap(),
            FlowOutcome::ConsumeFailed
        );
        platform.ledger().await.save(&ledger_path).unwrap();
    }

    // Out of process, the store acknowledged the purchase after all.
    let mut ledger = Ledger::load(&ledger_path).unwrap();
    let purchase = ledger.unconsumed.remove(0);
    ledger.consumed.push(purchase);

    let platform = SimulatedPlatform::with_ledger(SimulatedPlatform::default_catalog(), ledger);
    let store = JsonFileTransactionStore::open(&record_path).unwrap();
    assert_eq!(
        store.load().await.unwrap().unwrap().state,
        TransactionState::GrantComplete
    );
    let (mut orchestrator, _events) = common::session(
        GatewayKind::Token,
        &platform,
        Box::new(store.clone()),
        common::server_apis(&platform),
    );

    assert_eq!(
        orchestrator.recover("sku-2", 1).await.unwrap(),
        FlowOutcome::NothingToResume
    );
    assert!(store.load().await.unwrap().is_none());
    assert_eq!(platform.ledger().await.granted.len(), 1);
}
