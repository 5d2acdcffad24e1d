use crate::domain::ports::TransactionStore;
use crate::domain::transaction::TransactionRecord;
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding the pending transaction.
pub const CF_TRANSACTIONS: &str = "transactions";
/// The only key ever written: there is at most one pending transaction.
pub const PENDING_KEY: &[u8] = b"pending";

/// A persistent store implementation using RocksDB.
///
/// Keeps the record under a fixed key in its own Column Family. Writes are
/// synced so a record saved right before a crash is still there on restart.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "transactions" column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn missing_cf() -> BillingError {
        BillingError::InternalError(Box::new(std::io::Error::other(
            "Transactions column family not found",
        )))
    }

    fn write_opts() -> rocksdb::WriteOptions {
        let mut opts = rocksdb::WriteOptions::default();
        opts.set_sync(true);
        opts
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn load(&self) -> Result<Option<TransactionRecord>> {
        let cf = self
            .db
            .cf_handle(CF_TRANSACTIONS)
            .ok_or_else(Self::missing_cf)?;

        match self.db.get_cf(&cf, PENDING_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: TransactionRecord) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_TRANSACTIONS)
            .ok_or_else(Self::missing_cf)?;

        let value = serde_json::to_vec(&record)?;
        self.db
            .put_cf_opt(&cf, PENDING_KEY, value, &Self::write_opts())?;

        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_TRANSACTIONS)
            .ok_or_else(Self::missing_cf)?;

        self.db
            .delete_cf_opt(&cf, PENDING_KEY, &Self::write_opts())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::TransactionState;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_TRANSACTIONS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_transaction_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        assert!(store.load().await.unwrap().is_none());

        let record = TransactionRecord::new("sku-1", "txn-1", TransactionState::PurchaseStart);
        store.save(record.clone()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record));

        store.delete().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_record_survives_reopen() {
        let dir = tempdir().unwrap();
        let record = TransactionRecord::new("sku-2", "txn-2", TransactionState::GrantComplete);
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.save(record.clone()).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record));
    }
}
