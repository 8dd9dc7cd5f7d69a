use serde::Deserialize;
use svcmetrics_core::error::{Result, SvcMetricsError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    pub service: ServiceSection,

    pub directory: DirectorySection,

    #[serde(default)]
    pub schedules: ScheduleSection,

    /// Required when `service.kind` is `elasticsearch`.
    #[serde(default)]
    pub aiven: Option<AivenSection>,

    #[serde(default)]
    pub aws: AwsSection,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(SvcMetricsError::BadConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.service.validate()?;
        self.directory.validate()?;
        self.schedules.validate()?;

        match (self.service.kind, &self.aiven) {
            (ServiceKind::Elasticsearch, None) => {
                return Err(SvcMetricsError::BadConfig(
                    "service.kind 'elasticsearch' needs an aiven section".into(),
                ))
            }
            (_, Some(aiven)) => aiven.validate()?,
            _ => {}
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(SvcMetricsError::BadConfig(
                "gateway.listen must be a valid socket address".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Redis,
    Elasticsearch,
    Example,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    /// Marketplace label of the exported service.
    pub name: String,
    pub kind: ServiceKind,
}

impl ServiceSection {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SvcMetricsError::BadConfig(
                "service.name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySection {
    pub api_address: String,

    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub skip_ssl_validation: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl DirectorySection {
    pub fn validate(&self) -> Result<()> {
        if !(self.api_address.starts_with("http://") || self.api_address.starts_with("https://"))
        {
            return Err(SvcMetricsError::BadConfig(
                "directory.api_address must be an http(s) URL".into(),
            ));
        }
        if !(1000..=300_000).contains(&self.request_timeout_ms) {
            return Err(SvcMetricsError::BadConfig(
                "directory.request_timeout_ms must be between 1000 and 300000".into(),
            ));
        }
        match (&self.username, &self.client_id) {
            (Some(_), Some(_)) => Err(SvcMetricsError::BadConfig(
                "directory: set either username/password or client_id/client_secret, not both"
                    .into(),
            )),
            (None, None) => Err(SvcMetricsError::BadConfig(
                "directory: username/password or client_id/client_secret is required".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSection {
    #[serde(default = "default_schedule_secs")]
    pub service_plans_secs: u64,
    #[serde(default = "default_schedule_secs")]
    pub spaces_secs: u64,
    #[serde(default = "default_schedule_secs")]
    pub orgs_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            service_plans_secs: default_schedule_secs(),
            spaces_secs: default_schedule_secs(),
            orgs_secs: default_schedule_secs(),
        }
    }
}

impl ScheduleSection {
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("service_plans_secs", self.service_plans_secs),
            ("spaces_secs", self.spaces_secs),
            ("orgs_secs", self.orgs_secs),
        ] {
            if !(10..=86_400).contains(&secs) {
                return Err(SvcMetricsError::BadConfig(format!(
                    "schedules.{name} must be between 10 and 86400"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AivenSection {
    pub project_name: String,
    pub prometheus_username: String,
    /// Usually supplied through `AIVEN_PROMETHEUS_PASSWORD`.
    #[serde(default)]
    pub prometheus_password: Option<String>,
    /// Prometheus `file_sd` JSON written by Aiven service discovery.
    pub targets_file: String,
    #[serde(default = "default_targets_refresh_secs")]
    pub targets_refresh_secs: u64,
    #[serde(default = "default_scrape_timeout_ms")]
    pub scrape_timeout_ms: u64,
}

impl AivenSection {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("project_name", &self.project_name),
            ("prometheus_username", &self.prometheus_username),
            ("targets_file", &self.targets_file),
        ] {
            if value.trim().is_empty() {
                return Err(SvcMetricsError::BadConfig(format!(
                    "aiven.{name} must not be empty"
                )));
            }
        }
        if self.prometheus_password.is_none() {
            return Err(SvcMetricsError::BadConfig(
                "aiven.prometheus_password is required".into(),
            ));
        }
        if !(5..=3_600).contains(&self.targets_refresh_secs) {
            return Err(SvcMetricsError::BadConfig(
                "aiven.targets_refresh_secs must be between 5 and 3600".into(),
            ));
        }
        if !(500..=60_000).contains(&self.scrape_timeout_ms) {
            return Err(SvcMetricsError::BadConfig(
                "aiven.scrape_timeout_ms must be between 500 and 60000".into(),
            ));
        }
        Ok(())
    }
}

/// Credentials always come from the default AWS chain.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsSection {
    /// Falls back to `AWS_REGION` and the rest of the default chain.
    #[serde(default)]
    pub region: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0:9299".into()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    concat!("svcmetrics/", env!("CARGO_PKG_VERSION")).into()
}
fn default_schedule_secs() -> u64 {
    900
}
fn default_targets_refresh_secs() -> u64 {
    60
}
fn default_scrape_timeout_ms() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "info".into()
}
