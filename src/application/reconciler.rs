use crate::domain::ports::PurchaseGateway;
use crate::domain::purchase::{Inventory, Purchase};
use crate::domain::transaction::{TransactionRecord, TransactionState};
use crate::error::GatewayError;
use tracing::{debug, warn};

/// Which products to ask the platform about when resuming a record.
#[derive(Debug, PartialEq, Clone)]
pub enum InventoryScope {
    /// The purchase may have gone through out of process: look at the whole catalog.
    Catalog(Vec<String>),
    /// Only the record's own product can still be waiting for consume.
    Product(String),
}

impl InventoryScope {
    /// Scope for a record, or `None` when its stage needs no inventory evidence.
    ///
    /// An empty catalog narrows a `PurchaseStart` query to the record's product.
    pub fn for_record(record: &TransactionRecord, catalog: &[String]) -> Option<Self> {
        match record.state {
            TransactionState::PurchaseStart if catalog.is_empty() => {
                Some(Self::Product(record.product_id.clone()))
            }
            TransactionState::PurchaseStart => Some(Self::Catalog(catalog.to_vec())),
            TransactionState::PurchaseComplete => None,
            TransactionState::GrantComplete => Some(Self::Product(record.product_id.clone())),
        }
    }

    pub fn product_ids(&self) -> Vec<String> {
        match self {
            Self::Catalog(ids) => ids.clone(),
            Self::Product(id) => vec![id.clone()],
        }
    }
}

/// What an inventory says about the interrupted transaction.
#[derive(Debug, PartialEq, Clone)]
pub enum Reconciliation {
    /// Grant this purchase. `ignored` counts further unconsumed purchases
    /// left untouched.
    Resume { purchase: Purchase, ignored: usize },
    /// Nothing waits for a grant or consume; the stored record is stale.
    NothingToResume,
}

/// Post-restart oracle: asks the platform which purchases are still unconsumed.
pub struct InventoryReconciler<'a> {
    gateway: &'a dyn PurchaseGateway,
}

impl<'a> InventoryReconciler<'a> {
    pub fn new(gateway: &'a dyn PurchaseGateway) -> Self {
        Self { gateway }
    }

    /// Queries the platform and keeps only purchases of the asked-for products.
    pub async fn unconsumed(&self, product_ids: &[String]) -> Result<Inventory, GatewayError> {
        if !self.gateway.capabilities().inventory {
            return Err(GatewayError::Unsupported("inventory query"));
        }
        let mut inventory = self.gateway.query_inventory(product_ids).await?;
        inventory
            .purchases
            .retain(|p| product_ids.contains(&p.product_id));
        debug!(
            asked = product_ids.len(),
            unconsumed = inventory.purchases.len(),
            "inventory received"
        );
        Ok(inventory)
    }

    /// Picks the recovery target. At most one interrupted transaction is
    /// expected, so only the first unconsumed purchase is used.
    pub fn decide(inventory: &Inventory) -> Reconciliation {
        match inventory.purchases.split_first() {
            Some((first, rest)) => {
                if !rest.is_empty() {
                    warn!(
                        product_id = %first.product_id,
                        ignored = rest.len(),
                        "several unconsumed purchases found; resuming the first only"
                    );
                }
                Reconciliation::Resume {
                    purchase: first.clone(),
                    ignored: rest.len(),
                }
            }
            None => Reconciliation::NothingToResume,
        }
    }
}
