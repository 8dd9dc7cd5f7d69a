//! Builder -> dispatcher -> correlator -> renderer, end to end.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use svcmetrics_core::catalog::{MetricCatalog, Vocabulary};
use svcmetrics_core::correlate::correlate;
use svcmetrics_core::dispatch::{dispatch, MetricDataApi};
use svcmetrics_core::exposition::{group_into_families, render_to_string};
use svcmetrics_core::model::{
    Dimension, Labels, MetricDataPage, MetricQuery, RawResultSeries, Sample, TimeWindow,
};
use svcmetrics_core::query::build_queries;
use svcmetrics_core::Result;

/// Answers each query with a fixed value keyed by resource name and no
/// timestamps.
struct CannedApi;

#[async_trait]
impl MetricDataApi for CannedApi {
    async fn get_metric_data(
        &self,
        queries: &[MetricQuery],
        _window: &TimeWindow,
    ) -> Result<MetricDataPage> {
        let results = queries
            .iter()
            .map(|q| {
                let value = match q.resource_name.as_str() {
                    "node-a" => 42.0,
                    "node-b" => 7.0,
                    other => panic!("unexpected resource {other}"),
                };
                RawResultSeries {
                    id: q.id.clone(),
                    timestamps: vec![],
                    values: vec![value],
                    warnings: vec![],
                }
            })
            .collect();
        Ok(MetricDataPage {
            results,
            ..Default::default()
        })
    }
}

fn cpu_only_catalog() -> MetricCatalog {
    MetricCatalog {
        namespace: "AWS/ElastiCache".into(),
        resource_dimension: "CacheClusterId".into(),
        cluster_metrics: vec!["CPUUtilization".into()],
        node_metrics: vec![],
        node_dimension: Dimension::new("CacheNodeId", "0001"),
    }
}

#[tokio::test]
async fn two_nodes_render_under_one_shared_header() {
    let resources: BTreeSet<String> = ["node-a".to_string(), "node-b".to_string()].into();
    let statistics = vec!["Average".to_string()];
    let end = Utc.with_ymd_and_hms(2024, 5, 1, 9, 55, 0).unwrap();
    let window = TimeWindow::new(end - Duration::minutes(5), end);

    let (queries, lookup) = build_queries(
        &resources,
        &cpu_only_catalog(),
        &statistics,
        window.period_secs(),
    );
    assert_eq!(queries[0].id, "q_0");
    assert_eq!(queries[0].resource_name, "node-a");
    assert_eq!(queries[1].id, "q_1");
    assert_eq!(queries[0].period_secs, 300);

    let results = dispatch(&CannedApi, &queries, &window).await.unwrap();
    let correlated = correlate(results, &lookup, &Vocabulary::redis()).unwrap();

    let samples = correlated.iter().flat_map(|(node, metrics)| {
        metrics.iter().map(move |(key, series)| {
            Sample::gauge(
                key.clone(),
                Labels::new().with("node", node.clone()),
                series.latest().map(|(_, v)| v),
            )
        })
    });
    let out = render_to_string(&group_into_families(samples));

    assert_eq!(out.matches("# HELP cpu_utilization_avg").count(), 1);
    assert_eq!(out.matches("# TYPE cpu_utilization_avg gauge").count(), 1);
    let lines: Vec<&str> = out
        .lines()
        .filter(|l| l.starts_with("cpu_utilization_avg{"))
        .collect();
    assert_eq!(
        lines,
        vec![
            "cpu_utilization_avg{node=\"node-a\"} 42",
            "cpu_utilization_avg{node=\"node-b\"} 7",
        ]
    );
}
