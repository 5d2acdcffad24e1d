use crate::domain::ports::TransactionStore;
use crate::domain::transaction::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory transaction store.
///
/// Uses `Arc<RwLock<Option<TransactionRecord>>>` so clones share the same slot.
/// Nothing survives a restart; meant for tests and for embedders that persist
/// the record themselves.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    record: Arc<RwLock<Option<TransactionRecord>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `record`, as if left by an earlier session.
    pub fn with_record(record: TransactionRecord) -> Self {
        Self {
            record: Arc::new(RwLock::new(Some(record))),
        }
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn load(&self) -> Result<Option<TransactionRecord>> {
        let record = self.record.read().await;
        Ok(record.clone())
    }

    async fn save(&self, record: TransactionRecord) -> Result<()> {
        let mut slot = self.record.write().await;
        *slot = Some(record);
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let mut slot = self.record.write().await;
        *slot = None;
        Ok(())
    }
}
