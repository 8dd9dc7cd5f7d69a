//! ElastiCache Redis metrics.
//!
//! Each service instance maps to a replication group whose member clusters
//! are the nodes we query. Node discovery and the monitoring API are
//! collaborators (see `services::aws` for the ElastiCache and CloudWatch
//! ones); this module owns the window, the batching pipeline and the label set.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use svcmetrics_core::catalog::{default_statistics, MetricCatalog, Vocabulary};
use svcmetrics_core::correlate::correlate;
use svcmetrics_core::dispatch::{dispatch, MetricDataApi};
use svcmetrics_core::error::Result;
use svcmetrics_core::model::{Labels, Sample, TimeWindow};
use svcmetrics_core::query::build_queries;

use crate::directory::ServiceInstance;
use crate::endpoint::{FetchContext, ServiceMetricFetcher};

/// One cache cluster backing a service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    pub cache_cluster_name: String,
    pub service_instance: ServiceInstance,
}

/// Finds the cache clusters behind each service instance.
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve_nodes(&self, instances: &[ServiceInstance]) -> Result<Vec<ResourceNode>>;
}

pub struct RedisMetricFetcher<R, M> {
    resolver: R,
    metrics: M,
    catalog: MetricCatalog,
    statistics: Vec<String>,
    vocabulary: Vocabulary,
}

impl<R: NodeResolver, M: MetricDataApi> RedisMetricFetcher<R, M> {
    /// Fails if the catalog has a metric or statistic with no exported name.
    pub fn new(resolver: R, metrics: M) -> Result<Self> {
        let catalog = MetricCatalog::redis();
        let statistics = default_statistics();
        let vocabulary = Vocabulary::redis();
        vocabulary.validate(&catalog, &statistics)?;
        Ok(Self {
            resolver,
            metrics,
            catalog,
            statistics,
            vocabulary,
        })
    }

    async fn fetch_at(&self, ctx: &FetchContext<'_>, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        let window = metrics_window(now);
        let username = ctx.user.username();

        let nodes: BTreeMap<String, ResourceNode> = self
            .resolver
            .resolve_nodes(ctx.service_instances)
            .await?
            .into_iter()
            .map(|n| (n.cache_cluster_name.clone(), n))
            .collect();
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(%username, number_of_nodes = nodes.len(), "fetching redis metrics");

        let resources: BTreeSet<String> = nodes.keys().cloned().collect();
        let (queries, lookup) = build_queries(
            &resources,
            &self.catalog,
            &self.statistics,
            window.period_secs(),
        );
        let results = dispatch(&self.metrics, &queries, &window).await?;
        let correlated = correlate(results, &lookup, &self.vocabulary)?;

        let mut samples = Vec::new();
        for (name, series_by_key) in correlated {
            let Some(node) = nodes.get(&name) else { continue };
            let labels = node_labels(ctx, node);
            for (key, series) in series_by_key {
                let sample = match series.latest() {
                    Some((ts, value)) => Sample::gauge(key, labels.clone(), Some(value))
                        .at(ts.unwrap_or(window.end)),
                    None => Sample::gauge(key, labels.clone(), None),
                };
                samples.push(sample);
            }
        }
        Ok(samples)
    }
}

#[async_trait]
impl<R: NodeResolver, M: MetricDataApi> ServiceMetricFetcher for RedisMetricFetcher<R, M> {
    async fn fetch_metrics(&self, ctx: &FetchContext<'_>) -> Result<Vec<Sample>> {
        self.fetch_at(ctx, Utc::now()).await
    }
}

/// `[now - 10m, now - 5m]`: the newest interval the provider has settled.
pub fn metrics_window(now: DateTime<Utc>) -> TimeWindow {
    TimeWindow::new(now - Duration::minutes(10), now - Duration::minutes(5))
}

/// Node number from a cluster name such as `cf-abc-0002-001` (third segment).
pub fn node_number(cache_cluster_name: &str) -> Option<u32> {
    cache_cluster_name.split('-').nth(2)?.parse().ok()
}

fn node_labels(ctx: &FetchContext<'_>, node: &ResourceNode) -> Labels {
    let si = &node.service_instance;
    let space = ctx.spaces_by_guid.get(&si.space_guid);
    let org = space.and_then(|s| ctx.orgs_by_guid.get(&s.organization_guid));

    let mut labels = Labels::new()
        .with("service_instance_name", si.name.as_str())
        .with("service_instance_guid", si.guid.as_str())
        .with("space_guid", si.space_guid.as_str())
        .with("space_name", space.map(|s| s.name.as_str()).unwrap_or_default())
        .with(
            "organisation_guid",
            space.map(|s| s.organization_guid.as_str()).unwrap_or_default(),
        )
        .with("organisation_name", org.map(|o| o.name.as_str()).unwrap_or_default())
        .with("service_plan_guid", si.service_plan_guid.as_str());
    if let Some(n) = node_number(&node.cache_cluster_name) {
        labels.insert("node", n.to_string());
    }
    labels
}
