use crate::error::{BillingError, Result};
use serde::{Deserialize, Serialize};

/// Stage reached by the durable transaction record.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum TransactionState {
    /// Start API completed, purchase not confirmed yet.
    PurchaseStart,
    /// Platform confirmed the purchase, item not granted yet.
    PurchaseComplete,
    /// Item granted, consume acknowledgment possibly unsent.
    GrantComplete,
}

/// The single record describing the purchase currently in flight.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionRecord {
    pub product_id: String,
    /// Id issued by the start API; empty when the server did not hand one back.
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub state: TransactionState,
}

fn default_quantity() -> u32 {
    1
}

impl TransactionRecord {
    pub fn new(
        product_id: impl Into<String>,
        transaction_id: impl Into<String>,
        state: TransactionState,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            transaction_id: transaction_id.into(),
            quantity: default_quantity(),
            state,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Moves the record to `next`, refusing to go back to an earlier stage.
    pub fn advance(&mut self, next: TransactionState) -> Result<()> {
        if next < self.state {
            return Err(BillingError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
