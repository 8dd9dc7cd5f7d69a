//! svcmetrics core: provider-agnostic metric plumbing shared by the gateway.
//!
//! This crate turns a set of cloud resources into batched monitoring queries,
//! correlates the anonymised results back to resource and metric, and renders
//! samples in the Prometheus text exposition format. It also reads that
//! format back, for services that already expose their own endpoint. It carries no HTTP or
//! runtime dependencies so it can be driven by the gateway, by embedders with
//! their own provider clients, and by tests.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! Every fallible path surfaces as `SvcMetricsError`/`Result` so a single bad
//! scrape can never take the process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod catalog;
pub mod correlate;
pub mod dispatch;
pub mod error;
pub mod exposition;
pub mod model;
pub mod parse;
pub mod query;

/// Shared result type.
pub use error::{Result, SvcMetricsError};
