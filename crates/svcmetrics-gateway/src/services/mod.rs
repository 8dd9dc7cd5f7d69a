//! Service-type strategies plugged into the metric endpoint.

pub mod aws;
pub mod elasticsearch;
pub mod example;
pub mod redis;

pub use aws::{CloudWatchMetricData, ElastiCacheNodeResolver};
pub use elasticsearch::{
    ElasticsearchMetricFetcher, HttpScraper, PrometheusTargetConfig, PrometheusTargetsStore,
    TargetScraper, TargetsFileSource,
};
pub use example::ExampleMetricFetcher;
pub use redis::{NodeResolver, RedisMetricFetcher, ResourceNode};
