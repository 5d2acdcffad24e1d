//! Application layer containing the purchase lifecycle orchestration.
//!
//! This module defines the `BillingOrchestrator`, the entry point callers use
//! to buy a product and to resume a transaction interrupted by a restart, and
//! the `InventoryReconciler` it consults to decide how that resumption goes.

pub mod orchestrator;
pub mod reconciler;
