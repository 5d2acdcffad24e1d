//! Domain types and the ports the orchestrator depends on.

pub mod api;
pub mod ports;
pub mod purchase;
pub mod transaction;
