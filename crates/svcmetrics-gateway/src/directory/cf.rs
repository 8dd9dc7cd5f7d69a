//! Cloud Foundry v2 directory client (reqwest).
//!
//! Tokens come from the UAA advertised by `/v2/info`, either with a password
//! grant (users, and the exporter when configured with a username) or a
//! client-credentials grant. Tokens are cached until shortly before expiry.
//! List calls follow `next_url` until the last page.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use svcmetrics_core::error::{Result, SvcMetricsError};

use super::{DirectoryApi, Org, Service, ServiceInstance, ServicePlan, Space};

/// Refresh this long before the UAA-reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// How the client obtains its bearer token.
#[derive(Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    ClientCredentials { client_id: String, client_secret: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { username, .. } => {
                f.debug_struct("Password").field("username", username).finish()
            }
            Credentials::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct CfClient {
    http: reqwest::Client,
    api_address: String,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
}

/// Build the shared HTTP client used for directory and UAA calls.
pub fn http_client(
    skip_ssl_validation: bool,
    timeout: Duration,
    user_agent: &str,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(skip_ssl_validation)
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| SvcMetricsError::BadConfig(format!("http client: {e}")))
}

impl CfClient {
    pub fn new(http: reqwest::Client, api_address: &str, credentials: Credentials) -> Self {
        Self {
            http,
            api_address: api_address.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Current bearer token, fetching a new one when missing or near expiry.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            if t.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
                return Ok(t.value.clone());
            }
        }
        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let info: InfoResponse = self
            .http
            .get(format!("{}/v2/info", self.api_address))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SvcMetricsError::Directory(format!("fetching /v2/info: {e}")))?
            .json()
            .await
            .map_err(|e| SvcMetricsError::Directory(format!("decoding /v2/info: {e}")))?;

        let token_url = format!("{}/oauth/token", info.token_endpoint.trim_end_matches('/'));
        let request = match &self.credentials {
            Credentials::Password { username, password } => self
                .http
                .post(&token_url)
                .basic_auth("cf", Some(""))
                .form(&[
                    ("grant_type", "password"),
                    ("username", username.as_str()),
                    ("password", password.as_str()),
                ]),
            Credentials::ClientCredentials {
                client_id,
                client_secret,
            } => self
                .http
                .post(&token_url)
                .basic_auth(client_id, Some(client_secret))
                .form(&[("grant_type", "client_credentials")]),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| SvcMetricsError::AuthFailed(format!("token request: {e}")))?;
        if !resp.status().is_success() {
            return Err(SvcMetricsError::AuthFailed(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SvcMetricsError::AuthFailed(format!("decoding token: {e}")))?;

        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    /// Fetch every page of a v2 list endpoint.
    async fn list<E: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<String>,
    ) -> Result<Vec<Resource<E>>> {
        let token = self.token().await?;
        let mut out = Vec::new();

        let mut request = self.http.get(format!("{}{path}", self.api_address));
        if let Some(q) = &query {
            request = request.query(&[("q", q.as_str())]);
        }

        loop {
            let page: Page<E> = request
                .bearer_auth(&token)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| SvcMetricsError::Directory(format!("listing {path}: {e}")))?
                .json()
                .await
                .map_err(|e| SvcMetricsError::Directory(format!("decoding {path}: {e}")))?;

            let resources = page
                .resources
                .ok_or_else(|| SvcMetricsError::Directory(format!("list of {path} was nil")))?;
            out.extend(resources);

            match page.next_url {
                Some(next) if !next.is_empty() => {
                    request = self.http.get(format!("{}{next}", self.api_address));
                }
                _ => break,
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DirectoryApi for CfClient {
    async fn list_services_by_label(&self, label: &str) -> Result<Vec<Service>> {
        let raw = self
            .list::<ServiceEntity>("/v2/services", Some(format!("label:{label}")))
            .await?;
        Ok(raw
            .into_iter()
            .map(|r| Service {
                guid: r.metadata.guid,
                label: r.entity.label,
            })
            .collect())
    }

    async fn list_service_plans(&self, service_guid: &str) -> Result<Vec<ServicePlan>> {
        let raw = self
            .list::<ServicePlanEntity>(
                "/v2/service_plans",
                Some(format!("service_guid:{service_guid}")),
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|r| ServicePlan {
                guid: r.metadata.guid,
                name: r.entity.name,
                service_guid: r.entity.service_guid,
            })
            .collect())
    }

    async fn list_service_instances_by_plans(
        &self,
        plan_guids: &[String],
    ) -> Result<Vec<ServiceInstance>> {
        if plan_guids.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .list::<ServiceInstanceEntity>(
                "/v2/service_instances",
                Some(format!("service_plan_guid IN {}", plan_guids.join(","))),
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|r| ServiceInstance {
                guid: r.metadata.guid,
                name: r.entity.name,
                space_guid: r.entity.space_guid,
                service_plan_guid: r.entity.service_plan_guid,
                created_at: r.metadata.created_at.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_spaces(&self) -> Result<Vec<Space>> {
        let raw = self.list::<SpaceEntity>("/v2/spaces", None).await?;
        Ok(raw
            .into_iter()
            .map(|r| Space {
                guid: r.metadata.guid,
                name: r.entity.name,
                organization_guid: r.entity.organization_guid,
            })
            .collect())
    }

    async fn list_orgs(&self) -> Result<Vec<Org>> {
        let raw = self.list::<OrgEntity>("/v2/organizations", None).await?;
        Ok(raw
            .into_iter()
            .map(|r| Org {
                guid: r.metadata.guid,
                name: r.entity.name,
            })
            .collect())
    }
}

// --------------------
// Wire types
// --------------------
#[derive(Debug, Deserialize)]
struct InfoResponse {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    600
}

#[derive(Debug, Deserialize)]
struct Page<E> {
    next_url: Option<String>,
    resources: Option<Vec<Resource<E>>>,
}

#[derive(Debug, Deserialize)]
struct Resource<E> {
    metadata: Metadata,
    entity: E,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntity {
    label: String,
}

#[derive(Debug, Deserialize)]
struct ServicePlanEntity {
    name: String,
    service_guid: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInstanceEntity {
    name: String,
    space_guid: String,
    service_plan_guid: String,
}

#[derive(Debug, Deserialize)]
struct SpaceEntity {
    name: String,
    organization_guid: String,
}

#[derive(Debug, Deserialize)]
struct OrgEntity {
    name: String,
}
