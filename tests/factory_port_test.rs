use iap_billing::domain::ports::{TransactionStoreBox, TransactionStoreFactory};
use iap_billing::domain::transaction::{TransactionRecord, TransactionState};
use iap_billing::infrastructure::file::JsonFileTransactionStore;
use iap_billing::infrastructure::in_memory::InMemoryTransactionStore;
use tempfile::tempdir;

#[tokio::test]
async fn test_factory_instantiation() {
    let factory: TransactionStoreFactory =
        Box::new(|| Box::new(InMemoryTransactionStore::new()) as TransactionStoreBox);

    let store = factory();
    let record = TransactionRecord::new("sku-1", "txn-1", TransactionState::PurchaseStart);

    // Verify it works
    store.save(record).await.unwrap();
    let retrieved = store.load().await.unwrap().unwrap();
    assert_eq!(retrieved.product_id, "sku-1");

    // Each call yields an independent store.
    assert!(factory().load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_factory_shares_state_across_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transaction.json");
    let factory: TransactionStoreFactory = Box::new(move || {
        Box::new(JsonFileTransactionStore::open(&path).unwrap()) as TransactionStoreBox
    });

    let handle = tokio::spawn(async move {
        let first = factory();
        first
            .save(TransactionRecord::new("sku-2", "txn-2", TransactionState::GrantComplete))
            .await
            .unwrap();
        // A second instance stands in for the next process.
        factory().load().await.unwrap().unwrap()
    });

    let retrieved = handle.await.unwrap();
    assert_eq!(retrieved.state, TransactionState::GrantComplete);
}
