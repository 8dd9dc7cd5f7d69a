//! Marketplace directory API: the records we read and the calls we make.
//!
//! The directory owns pagination; callers always see complete collections.

pub mod cf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use svcmetrics_core::error::Result;

pub use cf::{CfClient, Credentials};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub guid: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub guid: String,
    pub name: String,
    pub service_guid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub guid: String,
    pub name: String,
    pub space_guid: String,
    pub service_plan_guid: String,
    /// RFC 3339 creation time as reported by the directory.
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub guid: String,
    pub name: String,
    pub organization_guid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub guid: String,
    pub name: String,
}

/// List-by-query calls against the directory.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn list_services_by_label(&self, label: &str) -> Result<Vec<Service>>;
    async fn list_service_plans(&self, service_guid: &str) -> Result<Vec<ServicePlan>>;
    async fn list_service_instances_by_plans(
        &self,
        plan_guids: &[String],
    ) -> Result<Vec<ServiceInstance>>;
    async fn list_spaces(&self) -> Result<Vec<Space>>;
    async fn list_orgs(&self) -> Result<Vec<Org>>;
}
