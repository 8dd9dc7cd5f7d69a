//! Cloud Foundry login: a password grant on behalf of the caller.

use std::sync::Arc;

use async_trait::async_trait;

use svcmetrics_core::error::Result;

use super::{Authenticator, User};
use crate::directory::{CfClient, Credentials, DirectoryApi, ServiceInstance};

pub struct CfAuthenticator {
    http: reqwest::Client,
    api_address: String,
}

impl CfAuthenticator {
    pub fn new(http: reqwest::Client, api_address: impl Into<String>) -> Self {
        Self {
            http,
            api_address: api_address.into(),
        }
    }
}

#[async_trait]
impl Authenticator for CfAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Arc<dyn User>> {
        let client = CfClient::new(
            self.http.clone(),
            &self.api_address,
            Credentials::Password {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        // Fetching a token is the login.
        client.token().await?;
        Ok(Arc::new(CfUser {
            username: username.to_string(),
            client,
        }))
    }
}

/// Directory calls made with the caller's own token.
pub struct CfUser {
    username: String,
    client: CfClient,
}

#[async_trait]
impl User for CfUser {
    fn username(&self) -> &str {
        &self.username
    }

    async fn list_service_instances_matching_plan_guids(
        &self,
        plan_guids: &[String],
    ) -> Result<Vec<ServiceInstance>> {
        self.client.list_service_instances_by_plans(plan_guids).await
    }
}
