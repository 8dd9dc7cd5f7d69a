//! svcmetrics exporter binary.
//!
//! Boot order: config -> logging -> directory client -> snapshot caches
//! (each must load once) -> service strategy (and its own cache, if any) ->
//! HTTP. Runs until SIGINT or SIGTERM, a server failure, or a cache refresh
//! loop giving up.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use svcmetrics_core::error::{Result, SvcMetricsError};
use svcmetrics_gateway::{
    app_state::AppState,
    auth::CfAuthenticator,
    config::{self, ExporterConfig, ServiceKind},
    directory::{cf::http_client, CfClient, DirectoryApi},
    endpoint::{MetricEndpoint, ServiceMetricFetcher},
    router,
    shutdown::shutdown_signal,
    services::{
        aws,
        elasticsearch::SCRAPE_USER_AGENT,
        CloudWatchMetricData, ElastiCacheNodeResolver, ElasticsearchMetricFetcher,
        ExampleMetricFetcher, HttpScraper, RedisMetricFetcher, TargetsFileSource,
    },
    snapshot::{OrgsSource, ServicePlansSource, SnapshotFetcher, SpacesSource},
};

const CONFIG_ENV: &str = "SVCMETRICS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "svcmetrics.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("svcmetrics: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.as_str()));
    fmt().with_env_filter(filter).init();

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.client_code().as_str(), "svcmetrics exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: ExporterConfig) -> Result<()> {
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| SvcMetricsError::BadConfig(format!("gateway.listen: {e}")))?;

    let dir = &cfg.directory;
    let http = http_client(
        dir.skip_ssl_validation,
        Duration::from_millis(dir.request_timeout_ms),
        &dir.user_agent,
    )?;
    let client: Arc<dyn DirectoryApi> =
        Arc::new(CfClient::new(http.clone(), &dir.api_address, dir.credentials()?));

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let service_plans = Arc::new(SnapshotFetcher::new(
        ServicePlansSource::new(Arc::clone(&client), cfg.service.name.clone()),
        Duration::from_secs(cfg.schedules.service_plans_secs),
    ));
    let spaces = Arc::new(SnapshotFetcher::new(
        SpacesSource::new(Arc::clone(&client)),
        Duration::from_secs(cfg.schedules.spaces_secs),
    ));
    let orgs = Arc::new(SnapshotFetcher::new(
        OrgsSource::new(Arc::clone(&client)),
        Duration::from_secs(cfg.schedules.orgs_secs),
    ));

    let mut plans_loop = service_plans.start(cancel_rx.clone()).await?;
    let mut spaces_loop = spaces.start(cancel_rx.clone()).await?;
    let mut orgs_loop = orgs.start(cancel_rx.clone()).await?;
    let (fetcher, mut targets_loop) = service_fetcher(&cfg, cancel_rx.clone()).await?;

    let endpoint = MetricEndpoint::new(service_plans, spaces, orgs, fetcher);
    let authenticator = Arc::new(CfAuthenticator::new(http, dir.api_address.clone()));
    let app = router::build_router(AppState::new(endpoint, authenticator));

    tracing::info!(%listen, service_name = %cfg.service.name, "svcmetrics starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| SvcMetricsError::Internal(format!("bind {listen}: {e}")))?;

    let shutdown = cancel_rx.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown = shutdown;
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let outcome = tokio::select! {
        r = &mut server => match r {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SvcMetricsError::Internal(format!("server failed: {e}"))),
            Err(e) => Err(SvcMetricsError::Internal(format!("server task: {e}"))),
        },
        r = &mut plans_loop => loop_ended("service plans", r),
        r = &mut spaces_loop => loop_ended("spaces", r),
        r = &mut orgs_loop => loop_ended("orgs", r),
        r = join_optional(&mut targets_loop) => loop_ended("prometheus targets", r),
        _ = shutdown_signal() => Ok(()),
    };

    let _ = cancel_tx.send(true);
    if !server.is_finished() {
        let _ = server.await;
    }
    outcome
}

type RefreshLoop = JoinHandle<Result<()>>;

/// Strategy for `service.kind`, plus the refresh loop it depends on, if any.
async fn service_fetcher(
    cfg: &ExporterConfig,
    cancel: watch::Receiver<bool>,
) -> Result<(Arc<dyn ServiceMetricFetcher>, Option<RefreshLoop>)> {
    match cfg.service.kind {
        ServiceKind::Example => {
            let fetcher: Arc<dyn ServiceMetricFetcher> = Arc::new(ExampleMetricFetcher::new());
            Ok((fetcher, None))
        }
        ServiceKind::Redis => {
            let sdk = aws::sdk_config(cfg.aws.region.as_deref()).await;
            let fetcher: Arc<dyn ServiceMetricFetcher> = Arc::new(RedisMetricFetcher::new(
                ElastiCacheNodeResolver::new(&sdk),
                CloudWatchMetricData::new(&sdk),
            )?);
            Ok((fetcher, None))
        }
        ServiceKind::Elasticsearch => {
            let aiven = cfg.aiven.as_ref().ok_or_else(|| {
                SvcMetricsError::BadConfig("service.kind 'elasticsearch' needs aiven".into())
            })?;
            let password = aiven.prometheus_password.clone().ok_or_else(|| {
                SvcMetricsError::BadConfig("aiven.prometheus_password is required".into())
            })?;

            let targets = Arc::new(SnapshotFetcher::new(
                TargetsFileSource::new(&aiven.targets_file),
                Duration::from_secs(aiven.targets_refresh_secs),
            ));
            let targets_loop = targets.start(cancel).await?;

            let http = http_client(
                false,
                Duration::from_millis(aiven.scrape_timeout_ms),
                SCRAPE_USER_AGENT,
            )?;
            let fetcher: Arc<dyn ServiceMetricFetcher> = Arc::new(ElasticsearchMetricFetcher::new(
                aiven.project_name.clone(),
                targets,
                HttpScraper::new(http, aiven.prometheus_username.clone(), password),
            ));
            Ok((fetcher, Some(targets_loop)))
        }
    }
}

async fn join_optional(
    handle: &mut Option<RefreshLoop>,
) -> std::result::Result<Result<()>, tokio::task::JoinError> {
    match handle {
        Some(h) => h.await,
        None => std::future::pending().await,
    }
}

fn loop_ended(
    name: &str,
    r: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match r {
        Ok(Ok(())) => Err(SvcMetricsError::Internal(format!(
            "{name} refresh loop stopped unexpectedly"
        ))),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(SvcMetricsError::Internal(format!("{name} refresh task: {e}"))),
    }
}
