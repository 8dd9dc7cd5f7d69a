//! Metric catalogs and the provider -> exporter vocabulary.
//!
//! A catalog is the fixed list of measurements the exporter requests for one
//! service type. The vocabulary maps provider names (`CPUUtilization`,
//! `Average`) onto exposition names (`cpu_utilization`, `avg`). Both are
//! checked against each other once at startup so a gap never surfaces as a
//! per-request failure.

use std::collections::HashMap;

use crate::error::{Result, SvcMetricsError};
use crate::model::Dimension;

/// Fixed metric list for one service type.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    pub namespace: String,
    /// Dimension naming the resource itself (e.g. `CacheClusterId`).
    pub resource_dimension: String,
    /// Metrics scoped to the whole resource.
    pub cluster_metrics: Vec<String>,
    /// Metrics scoped to one node of the resource.
    pub node_metrics: Vec<String>,
    /// Extra dimension carried by every node-scope query.
    pub node_dimension: Dimension,
}

impl MetricCatalog {
    /// ElastiCache Redis catalog.
    ///
    /// Cluster metrics: <https://docs.aws.amazon.com/AmazonElastiCache/latest/red-ug/CacheMetrics.Redis.html>
    /// Host metrics: <https://docs.aws.amazon.com/AmazonElastiCache/latest/red-ug/CacheMetrics.HostLevel.html>
    pub fn redis() -> Self {
        Self {
            namespace: "AWS/ElastiCache".into(),
            resource_dimension: "CacheClusterId".into(),
            cluster_metrics: strings(&[
                "CurrItems",
                "CacheHitRate",
                "Evictions",
                "CurrConnections",
                "NewConnections",
                "DatabaseMemoryUsagePercentage",
            ]),
            node_metrics: strings(&[
                "CPUUtilization",
                "SwapUsage",
                "NetworkBytesIn",
                "NetworkBytesOut",
            ]),
            node_dimension: Dimension::new("CacheNodeId", "0001"),
        }
    }

    /// Number of metrics requested per resource (before statistics).
    pub fn metrics_per_resource(&self) -> usize {
        self.cluster_metrics.len() + self.node_metrics.len()
    }

    pub fn all_metrics(&self) -> impl Iterator<Item = &str> {
        self.cluster_metrics
            .iter()
            .chain(self.node_metrics.iter())
            .map(String::as_str)
    }
}

/// Statistics requested for every catalog metric.
pub fn default_statistics() -> Vec<String> {
    strings(&["Average", "Minimum", "Maximum"])
}

/// Provider -> exporter name table.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    metrics: HashMap<String, String>,
    statistics: HashMap<String, String>,
}

impl Vocabulary {
    pub fn new(
        metrics: impl IntoIterator<Item = (String, String)>,
        statistics: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            metrics: metrics.into_iter().collect(),
            statistics: statistics.into_iter().collect(),
        }
    }

    /// Names for the ElastiCache Redis catalog.
    ///
    /// Written by hand: acronyms (`CPU`) make automatic snake-casing ugly.
    pub fn redis() -> Self {
        Self::new(
            pairs(&[
                ("CurrItems", "curr_items"),
                ("CacheHitRate", "cache_hit_rate"),
                ("Evictions", "evictions"),
                ("CurrConnections", "curr_connections"),
                ("NewConnections", "new_connections"),
                ("DatabaseMemoryUsagePercentage", "database_memory_usage_percentage"),
                ("CPUUtilization", "cpu_utilization"),
                ("SwapUsage", "swap_usage"),
                ("NetworkBytesIn", "network_bytes_in"),
                ("NetworkBytesOut", "network_bytes_out"),
            ]),
            pairs(&[("Average", "avg"), ("Minimum", "min"), ("Maximum", "max")]),
        )
    }

    pub fn metric(&self, provider_name: &str) -> Result<&str> {
        self.metrics
            .get(provider_name)
            .map(String::as_str)
            .ok_or_else(|| SvcMetricsError::MissingVocabulary {
                kind: "metric",
                name: provider_name.to_string(),
            })
    }

    pub fn statistic(&self, provider_name: &str) -> Result<&str> {
        self.statistics
            .get(provider_name)
            .map(String::as_str)
            .ok_or_else(|| SvcMetricsError::MissingVocabulary {
                kind: "statistic",
                name: provider_name.to_string(),
            })
    }

    /// `<metric>_<statistic>` in exporter vocabulary.
    pub fn metric_key(&self, metric_name: &str, statistic_name: &str) -> Result<String> {
        Ok(format!(
            "{}_{}",
            self.metric(metric_name)?,
            self.statistic(statistic_name)?
        ))
    }

    /// Startup check: every catalog metric and statistic must translate.
    pub fn validate(&self, catalog: &MetricCatalog, statistics: &[String]) -> Result<()> {
        for m in catalog.all_metrics() {
            self.metric(m)?;
        }
        for s in statistics {
            self.statistic(s)?;
        }
        Ok(())
    }
}

fn strings(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::error::ClientCode;

    #[test]
    fn redis_vocabulary_covers_redis_catalog() {
        Vocabulary::redis()
            .validate(&MetricCatalog::redis(), &default_statistics())
            .expect("redis tables must line up");
    }

    #[test]
    fn metric_key_joins_translated_names() {
        let key = Vocabulary::redis()
            .metric_key("CPUUtilization", "Average")
            .unwrap();
        assert_eq!(key, "cpu_utilization_avg");
    }

    #[test]
    fn gap_in_vocabulary_is_a_config_error() {
        let mut catalog = MetricCatalog::redis();
        catalog.node_metrics.push("FreeableMemory".into());

        let err = Vocabulary::redis()
            .validate(&catalog, &default_statistics())
            .expect_err("missing entry must fail");
        assert_eq!(err.client_code(), ClientCode::BadConfig);
        assert!(err.to_string().contains("FreeableMemory"));
    }

    #[test]
    fn unknown_statistic_is_rejected() {
        let err = Vocabulary::redis()
            .validate(&MetricCatalog::redis(), &["p99".to_string()])
            .expect_err("p99 is not in the table");
        assert!(matches!(
            err,
            SvcMetricsError::MissingVocabulary { kind: "statistic", .. }
        ));
    }
}
