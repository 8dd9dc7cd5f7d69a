//! AWS-backed collaborators for the Redis strategy: CloudWatch answers the
//! metric queries and ElastiCache lists the member clusters of each
//! instance's replication group.

use async_trait::async_trait;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{
    Dimension as AwsDimension, MessageData, Metric, MetricDataQuery, MetricDataResult, MetricStat,
};
use chrono::{DateTime, Utc};

use svcmetrics_core::dispatch::MetricDataApi;
use svcmetrics_core::error::{Result, SvcMetricsError};
use svcmetrics_core::model::{MetricDataPage, MetricQuery, RawResultSeries, TimeWindow};

use super::redis::{NodeResolver, ResourceNode};
use crate::directory::ServiceInstance;

/// Shared SDK config: credentials from the default chain, region from
/// `region` or the environment.
pub async fn sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_sdk_cloudwatch::config::Region::new(region.to_string()));
    }
    loader.load().await
}

// --------------------
// CloudWatch
// --------------------
pub struct CloudWatchMetricData {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchMetricData {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatch::Client::new(sdk),
        }
    }
}

#[async_trait]
impl MetricDataApi for CloudWatchMetricData {
    async fn get_metric_data(
        &self,
        queries: &[MetricQuery],
        window: &TimeWindow,
    ) -> Result<MetricDataPage> {
        let mut request = self
            .client
            .get_metric_data()
            .start_time(to_aws(window.start))
            .end_time(to_aws(window.end));
        for q in queries {
            request = request.metric_data_queries(metric_data_query(q)?);
        }

        let out = request
            .send()
            .await
            .map_err(|e| SvcMetricsError::Provider(DisplayErrorContext(&e).to_string()))?;

        Ok(MetricDataPage {
            results: out.metric_data_results().iter().map(series_from_result).collect(),
            messages: out.messages().iter().map(message_text).collect(),
            next_token: out.next_token().map(str::to_string),
        })
    }
}

fn metric_data_query(q: &MetricQuery) -> Result<MetricDataQuery> {
    let mut metric = Metric::builder()
        .namespace(&q.namespace)
        .metric_name(&q.metric_name);
    for d in &q.dimensions {
        metric = metric.dimensions(
            AwsDimension::builder()
                .name(&d.name)
                .value(&d.value)
                .build(),
        );
    }

    let period = i32::try_from(q.period_secs)
        .map_err(|_| SvcMetricsError::Internal(format!("period {} out of range", q.period_secs)))?;
    let stat = MetricStat::builder()
        .metric(metric.build())
        .period(period)
        .stat(&q.statistic)
        .build();

    Ok(MetricDataQuery::builder()
        .id(&q.id)
        .metric_stat(stat)
        .build())
}

fn build_error(e: aws_sdk_cloudwatch::error::BuildError) -> SvcMetricsError {
    SvcMetricsError::Internal(format!("building metric data query: {e}"))
}

fn series_from_result(r: &MetricDataResult) -> RawResultSeries {
    RawResultSeries {
        id: r.id().unwrap_or_default().to_string(),
        timestamps: r.timestamps().iter().filter_map(from_aws).collect(),
        values: r.values().to_vec(),
        warnings: r.messages().iter().map(message_text).collect(),
    }
}

fn message_text(m: &MessageData) -> String {
    match (m.code(), m.value()) {
        (Some(code), Some(value)) => format!("{code}: {value}"),
        (Some(text), None) | (None, Some(text)) => text.to_string(),
        (None, None) => "unspecified message".to_string(),
    }
}

fn to_aws(t: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_millis(t.timestamp_millis())
}

fn from_aws(t: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}

// --------------------
// ElastiCache
// --------------------
pub struct ElastiCacheNodeResolver {
    client: aws_sdk_elasticache::Client,
}

impl ElastiCacheNodeResolver {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_elasticache::Client::new(sdk),
        }
    }

    async fn member_clusters(&self, replication_group: &str) -> Result<Vec<String>> {
        let out = self
            .client
            .describe_replication_groups()
            .replication_group_id(replication_group)
            .send()
            .await
            .map_err(|e| {
                SvcMetricsError::Provider(format!(
                    "fetching replication group '{replication_group}': {}",
                    aws_sdk_elasticache::error::DisplayErrorContext(&e)
                ))
            })?;

        match out.replication_groups() {
            [group] => Ok(group.member_clusters().to_vec()),
            groups => Err(SvcMetricsError::Provider(format!(
                "got {} results fetching replication group '{replication_group}', expected 1",
                groups.len()
            ))),
        }
    }
}

#[async_trait]
impl NodeResolver for ElastiCacheNodeResolver {
    async fn resolve_nodes(&self, instances: &[ServiceInstance]) -> Result<Vec<ResourceNode>> {
        let mut nodes = Vec::new();
        for si in instances {
            let group = replication_group_name(&si.guid);
            for cache_cluster_name in self.member_clusters(&group).await? {
                nodes.push(ResourceNode {
                    cache_cluster_name,
                    service_instance: si.clone(),
                });
            }
        }
        Ok(nodes)
    }
}

/// Replication group the broker creates for an instance: `cf-` followed by
/// the base-36 FNV-1a 64-bit hash of the instance guid.
pub fn replication_group_name(instance_guid: &str) -> String {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = instance_guid
        .bytes()
        .fold(OFFSET_BASIS, |h, b| (h ^ u64::from(b)).wrapping_mul(PRIME));
    format!("cf-{}", base36(hash))
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.iter().rev().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn replication_group_names_fit_elasticache_limits() {
        let name = replication_group_name("9c2a5b4e-0b4d-4a55-9d4e-2f0d1f7b3c11");
        assert!(name.starts_with("cf-"));
        assert!(name.len() <= 20, "{name} is too long");
        assert!(name[3..].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert!(!name.contains("--"));

        assert_eq!(name, replication_group_name("9c2a5b4e-0b4d-4a55-9d4e-2f0d1f7b3c11"));
        assert_ne!(name, replication_group_name("another-guid"));
    }

    #[test]
    fn fnv_hash_of_empty_input_is_the_offset_basis() {
        assert_eq!(replication_group_name(""), format!("cf-{}", base36(0xcbf2_9ce4_8422_2325)));
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(0), "0");
    }

    #[test]
    fn results_translate_to_raw_series() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 55, 0).unwrap();
        let result = MetricDataResult::builder()
            .id("q_3")
            .timestamps(to_aws(at))
            .values(42.0)
            .messages(MessageData::builder().code("PartialData").value("some points missing").build())
            .build();

        let series = series_from_result(&result);
        assert_eq!(series.id, "q_3");
        assert_eq!(series.timestamps, vec![at]);
        assert_eq!(series.values, vec![42.0]);
        assert_eq!(series.warnings, vec!["PartialData: some points missing"]);
    }

    #[test]
    fn timestamps_survive_the_sdk_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 50, 0).unwrap();
        assert_eq!(from_aws(&to_aws(at)), Some(at));
    }

    #[test]
    fn queries_translate_without_error() {
        let q = MetricQuery {
            id: "q_0".into(),
            resource_name: "cf-abc-0001-001".into(),
            namespace: "AWS/ElastiCache".into(),
            metric_name: "CPUUtilization".into(),
            dimensions: vec![
                svcmetrics_core::model::Dimension::new("CacheClusterId", "cf-abc-0001-001"),
                svcmetrics_core::model::Dimension::new("CacheNodeId", "0001"),
            ],
            period_secs: 300,
            statistic: "Average".into(),
        };
        assert!(metric_data_query(&q).is_ok());

        let too_long = MetricQuery {
            period_secs: i64::from(i32::MAX) + 1,
            ..q
        };
        assert!(metric_data_query(&too_long).is_err());
    }
}
