//! Minimal fetcher: how long each service instance has existed.
//!
//! Needs nothing beyond the directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use svcmetrics_core::error::Result;
use svcmetrics_core::model::{Labels, Sample};

use crate::endpoint::{FetchContext, ServiceMetricFetcher};

pub const SERVICE_AGE_SECONDS: &str = "service_age_seconds";

#[derive(Debug, Default)]
pub struct ExampleMetricFetcher;

impl ExampleMetricFetcher {
    pub fn new() -> Self {
        Self
    }

    fn fetch_at(&self, ctx: &FetchContext<'_>, now: DateTime<Utc>) -> Vec<Sample> {
        let username = ctx.user.username();
        let mut samples = Vec::with_capacity(ctx.service_instances.len());
        for si in ctx.service_instances {
            let created_at = match DateTime::parse_from_rfc3339(&si.created_at) {
                Ok(t) => t.with_timezone(&Utc),
                Err(e) => {
                    tracing::error!(
                        %username,
                        service_instance_guid = %si.guid,
                        created_at = %si.created_at,
                        error = %e,
                        "unparsable creation time"
                    );
                    continue;
                }
            };
            let age = (now - created_at).num_milliseconds() as f64 / 1000.0;
            let labels = Labels::new()
                .with("service_instance_name", si.name.as_str())
                .with("service_instance_guid", si.guid.as_str())
                .with("space_guid", si.space_guid.as_str());
            samples.push(Sample::gauge(SERVICE_AGE_SECONDS, labels, Some(age)));
        }
        samples
    }
}

#[async_trait]
impl ServiceMetricFetcher for ExampleMetricFetcher {
    async fn fetch_metrics(&self, ctx: &FetchContext<'_>) -> Result<Vec<Sample>> {
        Ok(self.fetch_at(ctx, Utc::now()))
    }
}
