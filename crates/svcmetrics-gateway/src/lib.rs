//! svcmetrics gateway library entry.
//!
//! This crate wires the directory client, snapshot caches, authentication,
//! and per-service fetchers into an HTTP exporter. It is consumed by the
//! binary (`main.rs`), by embedders that bring their own provider clients,
//! and by integration tests.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod directory;
pub mod endpoint;
pub mod ops;
pub mod router;
pub mod services;
pub mod shutdown;
pub mod snapshot;
