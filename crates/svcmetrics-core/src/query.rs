//! Query batch builder.
//!
//! Expands a resource set against a catalog into one query per
//! (resource, metric, statistic) and records the opaque id of each in a
//! request-scoped lookup table.

use std::collections::BTreeSet;

use crate::catalog::MetricCatalog;
use crate::model::{Dimension, MetricQuery, QueryIdentity, QueryLookup};

/// Build every query for `resources` plus the id -> identity side table.
///
/// Ids are `q_<n>` from a single monotonic counter, so they are unique for
/// the whole submission regardless of how it is later chunked.
pub fn build_queries(
    resources: &BTreeSet<String>,
    catalog: &MetricCatalog,
    statistics: &[String],
    period_secs: i64,
) -> (Vec<MetricQuery>, QueryLookup) {
    let capacity = resources.len() * catalog.metrics_per_resource() * statistics.len();
    let mut queries = Vec::with_capacity(capacity);
    let mut lookup = QueryLookup::with_capacity(capacity);
    let mut next_id = 0usize;

    for resource in resources {
        let resource_dim = Dimension::new(catalog.resource_dimension.clone(), resource.clone());

        let cluster = catalog
            .cluster_metrics
            .iter()
            .map(|m| (m, vec![resource_dim.clone()]));
        let node = catalog.node_metrics.iter().map(|m| {
            (
                m,
                vec![resource_dim.clone(), catalog.node_dimension.clone()],
            )
        });

        for (metric, dimensions) in cluster.chain(node) {
            for statistic in statistics {
                let id = format!("q_{next_id}");
                next_id += 1;

                lookup.insert(
                    id.clone(),
                    QueryIdentity {
                        resource_name: resource.clone(),
                        metric_name: metric.clone(),
                        statistic_name: statistic.clone(),
                    },
                );
                queries.push(MetricQuery {
                    id,
                    resource_name: resource.clone(),
                    namespace: catalog.namespace.clone(),
                    metric_name: metric.clone(),
                    dimensions: dimensions.clone(),
                    period_secs,
                    statistic: statistic.clone(),
                });
            }
        }
    }

    (queries, lookup)
}
