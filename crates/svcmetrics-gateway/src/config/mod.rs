//! Exporter config loader (strict parsing).

pub mod schema;

use std::fs;

use svcmetrics_core::error::{Result, SvcMetricsError};

use crate::directory::Credentials;

pub use schema::{
    AivenSection, AwsSection, DirectorySection, ExporterConfig, GatewaySection, ScheduleSection,
    ServiceKind, ServiceSection,
};

pub fn load_from_file(path: &str) -> Result<ExporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| SvcMetricsError::BadConfig(format!("read config {path} failed: {e}")))?;
    load_with_env(&s, |k| std::env::var(k).ok())
}

pub fn load_from_str(s: &str) -> Result<ExporterConfig> {
    load_with_env(s, |_| None)
}

/// Parse, apply secret overrides (`CF_PASSWORD`, `CF_CLIENT_SECRET`,
/// `AIVEN_PROMETHEUS_PASSWORD`), validate.
pub fn load_with_env(s: &str, env: impl Fn(&str) -> Option<String>) -> Result<ExporterConfig> {
    let mut cfg: ExporterConfig = serde_yaml::from_str(s)
        .map_err(|e| SvcMetricsError::BadConfig(format!("invalid yaml: {e}")))?;

    if let Some(p) = env("CF_PASSWORD") {
        cfg.directory.password = Some(p);
    }
    if let Some(p) = env("CF_CLIENT_SECRET") {
        cfg.directory.client_secret = Some(p);
    }
    if let (Some(aiven), Some(p)) = (cfg.aiven.as_mut(), env("AIVEN_PROMETHEUS_PASSWORD")) {
        aiven.prometheus_password = Some(p);
    }

    cfg.validate()?;
    Ok(cfg)
}

impl DirectorySection {
    /// Credentials the exporter itself uses for the snapshot caches.
    pub fn credentials(&self) -> Result<Credentials> {
        match (&self.username, &self.client_id) {
            (Some(username), None) => Ok(Credentials::Password {
                username: username.clone(),
                password: self.password.clone().ok_or_else(|| {
                    SvcMetricsError::BadConfig("directory.password is required".into())
                })?,
            }),
            (None, Some(client_id)) => Ok(Credentials::ClientCredentials {
                client_id: client_id.clone(),
                client_secret: self.client_secret.clone().ok_or_else(|| {
                    SvcMetricsError::BadConfig("directory.client_secret is required".into())
                })?,
            }),
            _ => Err(SvcMetricsError::BadConfig(
                "directory credentials are ambiguous or missing".into(),
            )),
        }
    }
}
