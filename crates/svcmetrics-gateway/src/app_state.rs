//! Shared application state for the exporter.
//!
//! Cheap to clone; handlers and middleware receive it through axum `State`.

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::endpoint::MetricEndpoint;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    endpoint: MetricEndpoint,
    authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(endpoint: MetricEndpoint, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                endpoint,
                authenticator,
            }),
        }
    }

    pub fn endpoint(&self) -> &MetricEndpoint {
        &self.inner.endpoint
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.inner.authenticator.as_ref()
    }
}
