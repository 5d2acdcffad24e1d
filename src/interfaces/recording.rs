//! Flattened view of orchestrator callbacks.
//!
//! Every [`BillingEvents`] handler maps to one [`Recorded`] value, so a sink
//! only has to say what to do with a record: keep it ([`RecordingEvents`]) or
//! print it (`ConsoleEvents`).

use crate::domain::api::ApiKind;
use crate::domain::ports::BillingEvents;
use crate::domain::purchase::{Inventory, Purchase, SkuInfo};
use crate::error::{ApiError, GatewayError};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Unauthorized { message: String },
    BillingSupported,
    ApiFailed { api: ApiKind, message: String },
    PurchaseSucceeded { product_id: String, order_id: String },
    PurchaseFailed { message: String, code: Option<i32> },
    AwaitingVerification { purchase_data: String, signature: String },
    GrantCompleted,
    ConsumeSucceeded { product_id: String },
    ConsumeFailed { message: String },
    InventoryReceived { product_ids: Vec<String> },
    InventoryFailed { message: String },
    NothingToResume,
    ProductsReceived { product_ids: Vec<String> },
    ProductsFailed { message: String },
}

impl Recorded {
    pub fn name(&self) -> &'static str {
        match self {
            Recorded::Unauthorized { .. } => "unauthorized",
            Recorded::BillingSupported => "billing_supported",
            Recorded::ApiFailed { .. } => "api_failed",
            Recorded::PurchaseSucceeded { .. } => "purchase_succeeded",
            Recorded::PurchaseFailed { .. } => "purchase_failed",
            Recorded::AwaitingVerification { .. } => "awaiting_verification",
            Recorded::GrantCompleted => "grant_completed",
            Recorded::ConsumeSucceeded { .. } => "consume_succeeded",
            Recorded::ConsumeFailed { .. } => "consume_failed",
            Recorded::InventoryReceived { .. } => "inventory_received",
            Recorded::InventoryFailed { .. } => "inventory_failed",
            Recorded::NothingToResume => "nothing_to_resume",
            Recorded::ProductsReceived { .. } => "products_received",
            Recorded::ProductsFailed { .. } => "products_failed",
        }
    }
}

/// `event=<name> key=value ...`, one line per event.
impl fmt::Display for Recorded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event={}", self.name())?;
        match self {
            Recorded::Unauthorized { message }
            | Recorded::ConsumeFailed { message }
            | Recorded::InventoryFailed { message }
            | Recorded::ProductsFailed { message } => write!(f, " message={message:?}"),
            Recorded::ApiFailed { api, message } => write!(f, " api={api} message={message:?}"),
            Recorded::PurchaseSucceeded {
                product_id,
                order_id,
            } => write!(f, " product_id={product_id} order_id={order_id}"),
            Recorded::PurchaseFailed { message, code } => {
                write!(f, " message={message:?}")?;
                match code {
                    Some(code) => write!(f, " code={code}"),
                    None => Ok(()),
                }
            }
            Recorded::AwaitingVerification { signature, .. } => {
                write!(f, " signed={}", !signature.is_empty())
            }
            Recorded::ConsumeSucceeded { product_id } => write!(f, " product_id={product_id}"),
            Recorded::InventoryReceived { product_ids }
            | Recorded::ProductsReceived { product_ids } => {
                write!(f, " products={}", product_ids.join(","))
            }
            Recorded::BillingSupported | Recorded::GrantCompleted | Recorded::NothingToResume => {
                Ok(())
            }
        }
    }
}

fn describe(err: &GatewayError) -> String {
    match err {
        GatewayError::Rejected { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Anything that can take a [`Recorded`] event.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Recorded);
}

impl<S: EventSink> BillingEvents for S {
    fn on_unauthorized(&self, reason: &GatewayError) {
        self.record(Recorded::Unauthorized {
            message: describe(reason),
        });
    }

    fn on_billing_supported(&self) {
        self.record(Recorded::BillingSupported);
    }

    fn on_api_failed(&self, api: ApiKind, error: &ApiError) {
        self.record(Recorded::ApiFailed {
            api,
            message: error.to_string(),
        });
    }

    fn on_purchase_succeeded(&self, purchase: &Purchase) {
        self.record(Recorded::PurchaseSucceeded {
            product_id: purchase.product_id.clone(),
            order_id: purchase.order_id.clone(),
        });
    }

    fn on_purchase_failed(&self, error: &GatewayError) {
        self.record(Recorded::PurchaseFailed {
            message: describe(error),
            code: error.code(),
        });
    }

    fn on_purchase_awaiting_verification(&self, purchase_data: &str, signature: &str) {
        self.record(Recorded::AwaitingVerification {
            purchase_data: purchase_data.to_string(),
            signature: signature.to_string(),
        });
    }

    fn on_grant_completed(&self) {
        self.record(Recorded::GrantCompleted);
    }

    fn on_consume_succeeded(&self, purchase: &Purchase) {
        self.record(Recorded::ConsumeSucceeded {
            product_id: purchase.product_id.clone(),
        });
    }

    fn on_consume_failed(&self, error: &GatewayError) {
        self.record(Recorded::ConsumeFailed {
            message: describe(error),
        });
    }

    fn on_inventory_received(&self, inventory: &Inventory) {
        self.record(Recorded::InventoryReceived {
            product_ids: inventory
                .purchases
                .iter()
                .map(|p| p.product_id.clone())
                .collect(),
        });
    }

    fn on_inventory_failed(&self, error: &GatewayError) {
        self.record(Recorded::InventoryFailed {
            message: describe(error),
        });
    }

    fn on_nothing_to_resume(&self) {
        self.record(Recorded::NothingToResume);
    }

    fn on_products_received(&self, skus: &[SkuInfo]) {
        self.record(Recorded::ProductsReceived {
            product_ids: skus.iter().map(|s| s.product_id.clone()).collect(),
        });
    }

    fn on_products_failed(&self, error: &GatewayError) {
        self.record(Recorded::ProductsFailed {
            message: describe(error),
        });
    }
}

/// Keeps every event in order of arrival.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Recorded>> {
        // A panicking test thread must not hide the events seen so far.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.guard().clone()
    }

    /// Drains the events recorded so far.
    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.guard())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.guard().iter().map(Recorded::name).collect()
    }

    pub fn count(&self, filter: impl Fn(&Recorded) -> bool) -> usize {
        self.guard().iter().filter(|e| filter(e)).count()
    }
}

impl EventSink for RecordingEvents {
    fn record(&self, event: Recorded) {
        self.guard().push(event);
    }
}
