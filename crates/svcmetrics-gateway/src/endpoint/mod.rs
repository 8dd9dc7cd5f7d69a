//! Per-request metric endpoint.
//!
//! One scrape walks: resolve service -> resolve plans -> list the caller's
//! instances -> fetch service metrics -> group -> render. Every step reads
//! the snapshot caches or talks to the directory as the caller; failures are
//! logged in full and answered with a fixed public message.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use thiserror::Error;

use svcmetrics_core::error::Result;
use svcmetrics_core::exposition::{self, group_into_families};
use svcmetrics_core::model::{Families, Sample};

use crate::app_state::AppState;
use crate::auth::{AuthenticatedUser, User};
use crate::directory::{Org, Service, ServiceInstance, ServicePlan, Space};
use crate::snapshot::{OrgsStore, ServiceOffering, ServicePlansStore, SpacesStore};

/// Everything a per-service fetcher may need for one scrape.
pub struct FetchContext<'a> {
    pub user: &'a dyn User,
    pub service: &'a Service,
    pub service_plans: &'a [ServicePlan],
    /// Already narrowed to the caller and to the service's plans.
    pub service_instances: &'a [ServiceInstance],
    pub spaces_by_guid: &'a HashMap<String, Space>,
    pub orgs_by_guid: &'a HashMap<String, Org>,
}

/// Service-type specific metric collection.
#[async_trait]
pub trait ServiceMetricFetcher: Send + Sync {
    async fn fetch_metrics(&self, ctx: &FetchContext<'_>) -> Result<Vec<Sample>>;
}

/// Public failure of a scrape. The display text is the whole response body.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    #[error("an error occurred when trying to fetch the service")]
    ServiceNotFound,
    #[error("an error occurred when trying to list your service instances")]
    ListInstances,
    #[error("an error occurred when fetching metrics for your service instances")]
    FetchMetrics,
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "message": self.to_string() })),
        )
            .into_response()
    }
}

pub struct MetricEndpoint {
    service_plans: Arc<dyn ServicePlansStore>,
    spaces: Arc<dyn SpacesStore>,
    orgs: Arc<dyn OrgsStore>,
    fetcher: Arc<dyn ServiceMetricFetcher>,
}

impl MetricEndpoint {
    pub fn new(
        service_plans: Arc<dyn ServicePlansStore>,
        spaces: Arc<dyn SpacesStore>,
        orgs: Arc<dyn OrgsStore>,
        fetcher: Arc<dyn ServiceMetricFetcher>,
    ) -> Self {
        Self {
            service_plans,
            spaces,
            orgs,
            fetcher,
        }
    }

    /// Run one scrape for `user` and return the grouped families.
    pub async fn collect(&self, user: &dyn User) -> std::result::Result<Families, EndpointError> {
        let username = user.username();

        let Some(ServiceOffering {
            service,
            plans: service_plans,
        }) = self.service_plans.offering()
        else {
            tracing::error!(%username, "service not found in cache");
            return Err(EndpointError::ServiceNotFound);
        };

        let plan_guids: Vec<String> = service_plans.iter().map(|p| p.guid.clone()).collect();

        let spaces_by_guid: HashMap<String, Space> = self
            .spaces
            .spaces()
            .into_iter()
            .map(|s| (s.guid.clone(), s))
            .collect();
        let orgs_by_guid: HashMap<String, Org> = self
            .orgs
            .orgs()
            .into_iter()
            .map(|o| (o.guid.clone(), o))
            .collect();

        let mut service_instances = user
            .list_service_instances_matching_plan_guids(&plan_guids)
            .await
            .map_err(|e| {
                tracing::error!(%username, error = %e, "listing service instances failed");
                EndpointError::ListInstances
            })?;
        service_instances.retain(|si| plan_guids.contains(&si.service_plan_guid));

        tracing::debug!(
            %username,
            service_name = %service.label,
            number_of_instances = service_instances.len(),
            "fetching metrics"
        );

        let ctx = FetchContext {
            user,
            service: &service,
            service_plans: &service_plans,
            service_instances: &service_instances,
            spaces_by_guid: &spaces_by_guid,
            orgs_by_guid: &orgs_by_guid,
        };
        let samples = self.fetcher.fetch_metrics(&ctx).await.map_err(|e| {
            tracing::error!(%username, error = %e, "fetching service metrics failed");
            EndpointError::FetchMetrics
        })?;

        Ok(group_into_families(samples))
    }
}

/// `GET /metrics`
pub async fn metrics(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    let families = match state.endpoint().collect(user.as_ref()).await {
        Ok(families) => families,
        Err(e) => return e.into_response(),
    };

    let mut body = Vec::new();
    let content_length = exposition::render(&families, &mut body);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, exposition::CONTENT_TYPE.to_string()),
            (header::CONTENT_LENGTH, content_length.to_string()),
        ],
        body,
    )
        .into_response()
}
