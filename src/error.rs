use crate::domain::api::{ApiCallState, ApiKind};
use crate::domain::transaction::TransactionState;
use std::time::Duration;
use thiserror::Error;

/// Platform response code reported when the user backs out of the purchase sheet.
pub const USER_CANCELLED_CODE: i32 = -1005;
/// Platform response code for a purchase of a product that is still unconsumed.
pub const ITEM_ALREADY_OWNED_CODE: i32 = 7;

/// Local faults raised by the orchestrator and its stores.
///
/// External failures (API, purchase, consume, inventory) are not represented
/// here: they are reported through `BillingEvents` and never abort a flow.
#[derive(Error, Debug)]
pub enum BillingError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("transaction record cannot move from {from:?} back to {to:?}")]
    InvalidTransition {
        from: TransactionState,
        to: TransactionState,
    },
    #[error("a {state:?} transaction for {product_id} is still pending; run recovery first")]
    TransactionPending {
        product_id: String,
        state: TransactionState,
    },
    #[error("no target product selected")]
    NoTargetProduct,
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for BillingError {
    fn from(err: rocksdb::Error) -> Self {
        BillingError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;

/// Failure of a caller-supplied start or grant API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    Remote(String),
    #[error("{api} api returned while still in {state:?}")]
    Incomplete { api: ApiKind, state: ApiCallState },
    #[error("{api} api did not reach End within {timeout:?}")]
    TimedOut { api: ApiKind, timeout: Duration },
    #[error("{api} api task aborted: {reason}")]
    Aborted { api: ApiKind, reason: String },
    #[error("api progress cannot move from {from:?} back to {to:?}")]
    Regression { from: ApiCallState, to: ApiCallState },
}

impl ApiError {
    pub fn remote(message: impl Into<String>) -> Self {
        ApiError::Remote(message.into())
    }
}

/// Failure reported by the platform purchase library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("{message} (code {code:?})")]
    Rejected { message: String, code: Option<i32> },
    #[error("billing is not authorized on this device: {0}")]
    NotAuthorized(String),
    #[error("{0} is not supported by this platform")]
    Unsupported(&'static str),
    #[error("platform did not answer within {0:?}")]
    TimedOut(Duration),
}

impl GatewayError {
    pub fn rejected(message: impl Into<String>, code: Option<i32>) -> Self {
        GatewayError::Rejected {
            message: message.into(),
            code,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            GatewayError::Rejected { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_user_cancelled(&self) -> bool {
        self.code() == Some(USER_CANCELLED_CODE)
    }
}

/// Failure of a consume acknowledgment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsumeError {
    /// The platform holds no unconsumed purchase for the product.
    #[error("no unconsumed purchase to consume")]
    NothingToConsume,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
