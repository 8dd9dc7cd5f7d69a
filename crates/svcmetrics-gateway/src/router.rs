//! Axum router wiring.
//!
//! `/health` is open; `/metrics` sits behind Basic auth.

use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::{app_state::AppState, auth, endpoint, ops};

pub fn build_router(state: AppState) -> Router {
    let metrics = Router::new()
        .route("/metrics", get(endpoint::metrics))
        .route_layer(from_fn_with_state(state.clone(), auth::require_user));

    Router::new()
        .route("/health", get(ops::health))
        .merge(metrics)
        .with_state(state)
}
