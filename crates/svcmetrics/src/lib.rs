//! Top-level facade crate for svcmetrics.
//!
//! Re-exports the provider-agnostic pipeline and the HTTP exporter so
//! embedders (for example, a Redis deployment wiring its own node resolver
//! and monitoring client) can depend on a single crate.

pub mod core {
    pub use svcmetrics_core::*;
}

pub mod gateway {
    pub use svcmetrics_gateway::*;
}
