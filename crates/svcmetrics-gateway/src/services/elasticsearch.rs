//! Elasticsearch (Aiven) metrics.
//!
//! Aiven exposes a Prometheus endpoint on every node of a service. Service
//! discovery writes those nodes to a file in the Prometheus `file_sd` JSON
//! shape, one entry per Aiven service named `<project>-<instance guid>`. Each
//! scrape reads the user's instances, scrapes every node of each, keeps the
//! gauges and re-labels them for the tenant. A node that fails is logged and
//! skipped; the rest of the scrape still answers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;

use svcmetrics_core::error::{Result, SvcMetricsError};
use svcmetrics_core::model::{Labels, Sample};
use svcmetrics_core::parse::parse_gauges;

use crate::directory::ServiceInstance;
use crate::endpoint::{FetchContext, ServiceMetricFetcher};
use crate::snapshot::{SnapshotFetcher, SnapshotSource};

pub const SCRAPE_ACCEPT: &str =
    "application/openmetrics-text; version=0.0.1,text/plain;version=0.0.4;q=0.5,*/*;q=0.1";
pub const SCRAPE_USER_AGENT: &str = "svcmetrics-elasticsearch";

/// One `file_sd` entry: the nodes of a single Aiven service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrometheusTargetConfig {
    /// `host:port` of each node.
    pub targets: Vec<String>,
    pub labels: TargetLabels,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetLabels {
    #[serde(rename = "aiven_service_name")]
    pub service_name: String,
}

pub trait PrometheusTargetsStore: Send + Sync {
    fn targets(&self) -> Vec<PrometheusTargetConfig>;
}

/// Reads the discovery file on every refresh.
pub struct TargetsFileSource {
    path: PathBuf,
}

impl TargetsFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for TargetsFileSource {
    type Item = PrometheusTargetConfig;

    fn name(&self) -> &'static str {
        "prometheus targets"
    }

    async fn fetch(&self) -> Result<Option<Vec<PrometheusTargetConfig>>> {
        let path = self.path.display();
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SvcMetricsError::Provider(format!("reading {path}: {e}")))?;
        serde_json::from_str::<Option<Vec<PrometheusTargetConfig>>>(&raw)
            .map_err(|e| SvcMetricsError::Provider(format!("decoding {path}: {e}")))
    }
}

impl PrometheusTargetsStore for SnapshotFetcher<TargetsFileSource> {
    fn targets(&self) -> Vec<PrometheusTargetConfig> {
        self.get().items.clone()
    }
}

/// Fetches one node's exposition body.
#[async_trait]
pub trait TargetScraper: Send + Sync {
    async fn scrape(&self, target: &str) -> Result<String>;
}

/// `GET <scheme>://<target>/metrics` with Basic auth.
pub struct HttpScraper {
    http: reqwest::Client,
    scheme: String,
    username: String,
    password: String,
}

impl HttpScraper {
    pub fn new(
        http: reqwest::Client,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            scheme: "https".into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }
}

#[async_trait]
impl TargetScraper for HttpScraper {
    async fn scrape(&self, target: &str) -> Result<String> {
        let url = format!("{}://{target}/metrics", self.scheme);
        let resp = self
            .http
            .get(&url)
            .header(ACCEPT, SCRAPE_ACCEPT)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| SvcMetricsError::Provider(format!("scraping {url}: {e}")))?;
        if resp.status() != StatusCode::OK {
            return Err(SvcMetricsError::Provider(format!(
                "scraping {url}: server returned HTTP status {}",
                resp.status()
            )));
        }
        resp.text()
            .await
            .map_err(|e| SvcMetricsError::Provider(format!("reading {url}: {e}")))
    }
}

pub struct ElasticsearchMetricFetcher<S> {
    project_name: String,
    targets: Arc<dyn PrometheusTargetsStore>,
    scraper: S,
}

impl<S: TargetScraper> ElasticsearchMetricFetcher<S> {
    pub fn new(
        project_name: impl Into<String>,
        targets: Arc<dyn PrometheusTargetsStore>,
        scraper: S,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            targets,
            scraper,
        }
    }

    fn aiven_service_name(&self, si: &ServiceInstance) -> String {
        format!("{}-{}", self.project_name, si.guid)
    }
}

#[async_trait]
impl<S: TargetScraper> ServiceMetricFetcher for ElasticsearchMetricFetcher<S> {
    async fn fetch_metrics(&self, ctx: &FetchContext<'_>) -> Result<Vec<Sample>> {
        let username = ctx.user.username();
        let by_name: HashMap<String, PrometheusTargetConfig> = self
            .targets
            .targets()
            .into_iter()
            .map(|t| (t.labels.service_name.clone(), t))
            .collect();

        let mut samples = Vec::new();
        for si in ctx.service_instances {
            let Some(target) = by_name.get(&self.aiven_service_name(si)) else {
                tracing::info!(
                    %username,
                    service_instance_guid = %si.guid,
                    number_of_target_configs = by_name.len(),
                    "prometheus targets not found"
                );
                continue;
            };

            for node in &target.targets {
                let gauges = self
                    .scraper
                    .scrape(node)
                    .await
                    .and_then(|body| parse_gauges(&body));
                match gauges {
                    Ok(gauges) => {
                        samples.extend(gauges.into_iter().map(|g| relabel(g, node, si)));
                    }
                    Err(e) => {
                        tracing::error!(
                            %username,
                            service_instance_guid = %si.guid,
                            node_ip = %node,
                            error = %e,
                            "scraping target node failed"
                        );
                    }
                }
            }
        }
        Ok(samples)
    }
}

/// Tenant labels first; the node's own labels follow and win on a clash.
fn relabel(gauge: Sample, node: &str, si: &ServiceInstance) -> Sample {
    let mut labels = Labels::new()
        .with("node_ip", node)
        .with("service_instance_name", si.name.as_str())
        .with("service_instance_guid", si.guid.as_str())
        .with("space_guid", si.space_guid.as_str())
        .with("service_plan_guid", si.service_plan_guid.as_str());
    for (k, v) in gauge.labels.iter() {
        labels.insert(k, v);
    }
    Sample::gauge(gauge.metric_name, labels, gauge.value)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use axum::{
        http::{header, HeaderMap, StatusCode as AxumStatus},
        routing::get,
        Router,
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use parking_lot::Mutex;

    use super::*;
    use crate::auth::User;
    use crate::directory::Service;

    struct NamedUser;

    #[async_trait]
    impl User for NamedUser {
        fn username(&self) -> &str {
            "alice"
        }

        async fn list_service_instances_matching_plan_guids(
            &self,
            _plan_guids: &[String],
        ) -> Result<Vec<ServiceInstance>> {
            Ok(vec![])
        }
    }

    struct FixedTargets(Vec<PrometheusTargetConfig>);

    impl PrometheusTargetsStore for FixedTargets {
        fn targets(&self) -> Vec<PrometheusTargetConfig> {
            self.0.clone()
        }
    }

    /// Serves canned bodies per node; unknown nodes fail.
    #[derive(Default)]
    struct CannedScraper {
        bodies: HashMap<String, String>,
        scraped: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TargetScraper for CannedScraper {
        async fn scrape(&self, target: &str) -> Result<String> {
            self.scraped.lock().push(target.to_string());
            self.bodies
                .get(target)
                .cloned()
                .ok_or_else(|| SvcMetricsError::Provider(format!("{target} unreachable")))
        }
    }

    fn instance(guid: &str) -> ServiceInstance {
        ServiceInstance {
            guid: guid.into(),
            name: format!("es-{guid}"),
            space_guid: "space-1".into(),
            service_plan_guid: "plan-1".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn target(service_name: &str, nodes: &[&str]) -> PrometheusTargetConfig {
        PrometheusTargetConfig {
            targets: nodes.iter().map(|n| n.to_string()).collect(),
            labels: TargetLabels {
                service_name: service_name.into(),
            },
        }
    }

    const NODE_BODY: &str = "# TYPE es_heap_used_bytes gauge\n\
                             es_heap_used_bytes{host=\"n1\",service_plan_guid=\"from-node\"} 512\n\
                             # TYPE es_requests_total counter\n\
                             es_requests_total 9\n";

    async fn fetch(
        fetcher: &ElasticsearchMetricFetcher<CannedScraper>,
        instances: &[ServiceInstance],
    ) -> Vec<Sample> {
        let service = Service {
            guid: "svc".into(),
            label: "elasticsearch".into(),
        };
        let spaces = HashMap::new();
        let orgs = HashMap::new();
        let ctx = FetchContext {
            user: &NamedUser,
            service: &service,
            service_plans: &[],
            service_instances: instances,
            spaces_by_guid: &spaces,
            orgs_by_guid: &orgs,
        };
        fetcher.fetch_metrics(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn scrapes_every_node_and_relabels_gauges() {
        let scraper = CannedScraper {
            bodies: [
                ("10.0.0.1:9273".to_string(), NODE_BODY.to_string()),
                ("10.0.0.2:9273".to_string(), NODE_BODY.replace("512", "256")),
            ]
            .into(),
            ..Default::default()
        };
        let targets = Arc::new(FixedTargets(vec![target(
            "proj-si-1",
            &["10.0.0.1:9273", "10.0.0.2:9273"],
        )]));
        let fetcher = ElasticsearchMetricFetcher::new("proj", targets, scraper);

        let samples = fetch(&fetcher, &[instance("si-1")]).await;

        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.metric_name == "es_heap_used_bytes"));
        let first = &samples[0];
        assert_eq!(first.value, Some(512.0));
        let names: Vec<&str> = first.labels.iter().map(|(k, _)| k).collect();
        assert_eq!(
            names,
            vec![
                "node_ip",
                "service_instance_name",
                "service_instance_guid",
                "space_guid",
                "service_plan_guid",
                "host",
            ]
        );
        assert_eq!(first.labels.get("node_ip"), Some("10.0.0.1:9273"));
        assert_eq!(first.labels.get("service_instance_name"), Some("es-si-1"));
        assert_eq!(first.labels.get("service_plan_guid"), Some("from-node"));
        assert_eq!(samples[1].labels.get("node_ip"), Some("10.0.0.2:9273"));
        assert_eq!(samples[1].value, Some(256.0));
    }

    #[tokio::test]
    async fn failing_nodes_and_unknown_instances_are_skipped() {
        let scraper = CannedScraper {
            bodies: [
                ("10.0.0.1:9273".to_string(), NODE_BODY.to_string()),
                ("10.0.0.3:9273".to_string(), "garbage{".to_string()),
            ]
            .into(),
            ..Default::default()
        };
        let targets = Arc::new(FixedTargets(vec![
            target("proj-si-1", &["10.0.0.1:9273", "10.0.0.2:9273", "10.0.0.3:9273"]),
            target("other-si-2", &["10.9.9.9:9273"]),
        ]));
        let fetcher = ElasticsearchMetricFetcher::new("proj", targets, scraper);

        let samples = fetch(&fetcher, &[instance("si-1"), instance("si-2")]).await;

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels.get("node_ip"), Some("10.0.0.1:9273"));
        // si-2 is registered under another project, so it is never scraped.
        assert_eq!(
            *fetcher.scraper.scraped.lock(),
            vec!["10.0.0.1:9273", "10.0.0.2:9273", "10.0.0.3:9273"]
        );
    }

    #[test]
    fn decodes_file_sd_entries() {
        let raw = r#"[
            {"targets": ["10.0.0.1:9273", "10.0.0.2:9273"],
             "labels": {"aiven_cloud": "aws-eu-west-1", "aiven_service_name": "proj-si-1"}}
        ]"#;
        let parsed: Vec<PrometheusTargetConfig> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, vec![target("proj-si-1", &["10.0.0.1:9273", "10.0.0.2:9273"])]);
    }

    #[tokio::test]
    async fn targets_file_feeds_the_store() {
        let path = std::env::temp_dir()
            .join(format!("svcmetrics-targets-{}.json", std::process::id()));
        tokio::fs::write(
            &path,
            r#"[{"targets": ["10.0.0.1:9273"], "labels": {"aiven_service_name": "proj-si-1"}}]"#,
        )
        .await
        .unwrap();

        let store = SnapshotFetcher::new(TargetsFileSource::new(&path), Duration::from_secs(60));
        store.refresh().await.unwrap();
        assert_eq!(store.targets(), vec![target("proj-si-1", &["10.0.0.1:9273"])]);

        tokio::fs::write(&path, "null").await.unwrap();
        assert!(store.refresh().await.is_err());
        assert_eq!(store.targets().len(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(store.refresh().await.is_err());
    }

    async fn node_endpoint(headers: HeaderMap) -> (AxumStatus, String) {
        let expected = format!("Basic {}", STANDARD.encode("prom:secret"));
        let authorised = headers.get(header::AUTHORIZATION).map(|v| v.as_bytes())
            == Some(expected.as_bytes());
        let accepts = headers.get(header::ACCEPT).map(|v| v.as_bytes())
            == Some(SCRAPE_ACCEPT.as_bytes());
        if authorised && accepts {
            (AxumStatus::OK, NODE_BODY.to_string())
        } else {
            (AxumStatus::UNAUTHORIZED, String::new())
        }
    }

    #[tokio::test]
    async fn http_scraper_sends_basic_auth_and_accept() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/metrics", get(node_endpoint));
        tokio::spawn(async move { axum::serve(listener, app).await });

        let http =
            crate::directory::cf::http_client(false, Duration::from_secs(5), SCRAPE_USER_AGENT)
                .unwrap();
        let target = addr.to_string();

        let ok = HttpScraper::new(http.clone(), "prom", "secret").with_scheme("http");
        assert_eq!(ok.scrape(&target).await.unwrap(), NODE_BODY);

        let wrong = HttpScraper::new(http, "prom", "nope").with_scheme("http");
        let err = wrong.scrape(&target).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
