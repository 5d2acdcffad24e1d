use crate::error::GatewayError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which platform backend a deployment runs against.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Receipt-based store: one purchase call, no consume step.
    Receipt,
    /// Token-based store: purchases stay owned until explicitly consumed.
    Token,
}

impl GatewayKind {
    pub fn capabilities(self) -> GatewayCapabilities {
        match self {
            GatewayKind::Receipt => GatewayCapabilities {
                consume: false,
                inventory: false,
            },
            GatewayKind::Token => GatewayCapabilities {
                consume: true,
                inventory: true,
            },
        }
    }
}

/// Optional operations a gateway supports on top of `purchase`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct GatewayCapabilities {
    pub consume: bool,
    pub inventory: bool,
}

/// Opaque purchase artefact handed back by the platform.
///
/// Receipt-based stores fill `receipt`; token-based stores fill `token`,
/// `signature` and `original_json`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Purchase {
    pub product_id: String,
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_json: Option<String>,
}

impl Purchase {
    pub fn with_receipt(
        product_id: impl Into<String>,
        order_id: impl Into<String>,
        receipt: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            order_id: order_id.into(),
            token: None,
            signature: None,
            receipt: Some(receipt.into()),
            original_json: None,
        }
    }

    pub fn with_token(
        product_id: impl Into<String>,
        order_id: impl Into<String>,
        token: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            order_id: order_id.into(),
            token: Some(token.into()),
            signature: Some(signature.into()),
            receipt: None,
            original_json: None,
        }
    }
}

/// Store listing for a product.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SkuInfo {
    pub product_id: String,
    pub title: String,
    pub price: Decimal,
    pub currency: String,
}

/// Result of an inventory query: purchases not consumed yet, plus listings.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Inventory {
    pub purchases: Vec<Purchase>,
    pub skus: Vec<SkuInfo>,
}

/// How a platform purchase request ended.
#[derive(Debug, PartialEq, Clone)]
pub enum PurchaseOutcome {
    Succeeded(Purchase),
    Failed(GatewayError),
    /// Explicit cancellation reported by receipt-based stores.
    Cancelled(GatewayError),
    /// The platform holds the purchase but defers confirmation until the
    /// signed payload is verified.
    AwaitingVerification {
        purchase_data: String,
        signature: String,
    },
}
