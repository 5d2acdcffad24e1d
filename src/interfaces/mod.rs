//! Adapters between the orchestrator and the outside world: event sinks and
//! the product catalog file.

pub mod console;
pub mod csv;
pub mod recording;
