//! HTTP Basic authentication in front of the metric endpoint.
//!
//! The middleware exchanges the caller's credentials for a directory
//! [`User`] and stores it as an [`AuthenticatedUser`] request extension.
//! Handlers behind it can rely on the extension being present.

pub mod cf;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use svcmetrics_core::error::Result;

use crate::app_state::AppState;
use crate::directory::ServiceInstance;

pub use cf::{CfAuthenticator, CfUser};

pub const MISSING_CREDENTIALS: &str = "you must provide user credentials via http basic auth";
pub const LOGIN_FAILED: &str = "provided credentials did not login successfully";

/// A logged-in directory user, scoped to what they can see.
#[async_trait]
pub trait User: Send + Sync {
    fn username(&self) -> &str;

    /// Instances of the given plans visible to this user.
    async fn list_service_instances_matching_plan_guids(
        &self,
        plan_guids: &[String],
    ) -> Result<Vec<ServiceInstance>>;
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Arc<dyn User>>;
}

/// Request extension set by [`require_user`].
#[derive(Clone)]
pub struct AuthenticatedUser(pub Arc<dyn User>);

/// Reject the request unless it carries Basic credentials the directory accepts.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some((username, password)) = basic_credentials(&req) else {
        return unauthorized(MISSING_CREDENTIALS);
    };

    match state.authenticator().authenticate(&username, &password).await {
        Ok(user) => {
            req.extensions_mut().insert(AuthenticatedUser(user));
            next.run(req).await
        }
        Err(e) => {
            tracing::info!(%username, error = %e, "login rejected");
            unauthorized(LOGIN_FAILED)
        }
    }
}

fn basic_credentials(req: &Request<Body>) -> Option<(String, String)> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized(message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic")],
        Json(serde_json::json!({ "message": message })),
    )
        .into_response()
}
