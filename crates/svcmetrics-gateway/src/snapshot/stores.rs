//! Directory-backed snapshot sources and the read-side store traits.

use std::sync::Arc;

use async_trait::async_trait;

use svcmetrics_core::error::{Result, SvcMetricsError};

use super::{SnapshotFetcher, SnapshotSource};
use crate::directory::{DirectoryApi, Org, Service, ServicePlan, Space};

/// The exported service together with its plans.
#[derive(Debug, Clone)]
pub struct ServiceOffering {
    pub service: Service,
    pub plans: Vec<ServicePlan>,
}

pub trait ServicePlansStore: Send + Sync {
    /// Service and plans, both taken from the same snapshot.
    fn offering(&self) -> Option<ServiceOffering>;
}

pub trait SpacesStore: Send + Sync {
    fn spaces(&self) -> Vec<Space>;
}

pub trait OrgsStore: Send + Sync {
    fn orgs(&self) -> Vec<Org>;
}

/// Looks up the configured service by label, then lists its plans.
pub struct ServicePlansSource {
    api: Arc<dyn DirectoryApi>,
    service_name: String,
}

impl ServicePlansSource {
    pub fn new(api: Arc<dyn DirectoryApi>, service_name: impl Into<String>) -> Self {
        Self {
            api,
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for ServicePlansSource {
    type Item = ServiceOffering;

    fn name(&self) -> &'static str {
        "service plans"
    }

    async fn fetch(&self) -> Result<Option<Vec<ServiceOffering>>> {
        let mut services = self.api.list_services_by_label(&self.service_name).await?;
        if services.len() != 1 {
            return Err(SvcMetricsError::Directory(format!(
                "expected exactly one service labelled '{}', found {}",
                self.service_name,
                services.len()
            )));
        }
        let service = services.remove(0);
        let plans = self.api.list_service_plans(&service.guid).await?;
        Ok(Some(vec![ServiceOffering { service, plans }]))
    }
}

pub struct SpacesSource {
    api: Arc<dyn DirectoryApi>,
}

impl SpacesSource {
    pub fn new(api: Arc<dyn DirectoryApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SnapshotSource for SpacesSource {
    type Item = Space;

    fn name(&self) -> &'static str {
        "spaces"
    }

    async fn fetch(&self) -> Result<Option<Vec<Space>>> {
        self.api.list_spaces().await.map(Some)
    }
}

pub struct OrgsSource {
    api: Arc<dyn DirectoryApi>,
}

impl OrgsSource {
    pub fn new(api: Arc<dyn DirectoryApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SnapshotSource for OrgsSource {
    type Item = Org;

    fn name(&self) -> &'static str {
        "orgs"
    }

    async fn fetch(&self) -> Result<Option<Vec<Org>>> {
        self.api.list_orgs().await.map(Some)
    }
}

impl ServicePlansStore for SnapshotFetcher<ServicePlansSource> {
    fn offering(&self) -> Option<ServiceOffering> {
        self.get().items.first().cloned()
    }
}

impl SpacesStore for SnapshotFetcher<SpacesSource> {
    fn spaces(&self) -> Vec<Space> {
        self.get().items.clone()
    }
}

impl OrgsStore for SnapshotFetcher<OrgsSource> {
    fn orgs(&self) -> Vec<Org> {
        self.get().items.clone()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::directory::ServiceInstance;

    struct FakeDirectory {
        services: Vec<Service>,
    }

    #[async_trait]
    impl DirectoryApi for FakeDirectory {
        async fn list_services_by_label(&self, label: &str) -> Result<Vec<Service>> {
            Ok(self
                .services
                .iter()
                .filter(|s| s.label == label)
                .cloned()
                .collect())
        }

        async fn list_service_plans(&self, service_guid: &str) -> Result<Vec<ServicePlan>> {
            Ok(vec![ServicePlan {
                guid: "plan-1".into(),
                name: "small".into(),
                service_guid: service_guid.into(),
            }])
        }

        async fn list_service_instances_by_plans(
            &self,
            _plan_guids: &[String],
        ) -> Result<Vec<ServiceInstance>> {
            Ok(vec![])
        }

        async fn list_spaces(&self) -> Result<Vec<Space>> {
            Ok(vec![Space {
                guid: "space-1".into(),
                name: "dev".into(),
                organization_guid: "org-1".into(),
            }])
        }

        async fn list_orgs(&self) -> Result<Vec<Org>> {
            Err(SvcMetricsError::Directory("orgs unavailable".into()))
        }
    }

    fn service(guid: &str, label: &str) -> Service {
        Service {
            guid: guid.into(),
            label: label.into(),
        }
    }

    #[tokio::test]
    async fn service_plans_store_exposes_service_and_plans() {
        let api = Arc::new(FakeDirectory {
            services: vec![service("svc-1", "redis"), service("svc-2", "postgres")],
        });
        let fetcher = SnapshotFetcher::new(
            ServicePlansSource::new(api, "redis"),
            Duration::from_secs(60),
        );
        assert!(fetcher.offering().is_none());

        fetcher.refresh().await.unwrap();
        let offering = fetcher.offering().unwrap();
        assert_eq!(offering.service.guid, "svc-1");
        assert_eq!(offering.plans.len(), 1);
        assert_eq!(offering.plans[0].service_guid, "svc-1");
    }

    /// Hands out a new service guid on every lookup.
    struct RotatingDirectory {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl DirectoryApi for RotatingDirectory {
        async fn list_services_by_label(&self, label: &str) -> Result<Vec<Service>> {
            let n = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(vec![service(&format!("svc-{n}"), label)])
        }

        async fn list_service_plans(&self, service_guid: &str) -> Result<Vec<ServicePlan>> {
            Ok(vec![ServicePlan {
                guid: format!("plan-of-{service_guid}"),
                name: "small".into(),
                service_guid: service_guid.into(),
            }])
        }

        async fn list_service_instances_by_plans(
            &self,
            _plan_guids: &[String],
        ) -> Result<Vec<ServiceInstance>> {
            Ok(vec![])
        }

        async fn list_spaces(&self) -> Result<Vec<Space>> {
            Ok(vec![])
        }

        async fn list_orgs(&self) -> Result<Vec<Org>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn offering_is_read_from_a_single_snapshot() {
        let api = Arc::new(RotatingDirectory {
            lookups: AtomicUsize::new(0),
        });
        let fetcher = SnapshotFetcher::new(
            ServicePlansSource::new(api, "redis"),
            Duration::from_secs(60),
        );

        fetcher.refresh().await.unwrap();
        let held = fetcher.offering().unwrap();
        fetcher.refresh().await.unwrap();
        let fresh = fetcher.offering().unwrap();

        assert_eq!(held.service.guid, "svc-1");
        assert_eq!(held.plans[0].service_guid, "svc-1");
        assert_eq!(fresh.service.guid, "svc-2");
        assert_eq!(fresh.plans[0].service_guid, "svc-2");
    }

    #[tokio::test]
    async fn service_lookup_must_be_unique() {
        let api = Arc::new(FakeDirectory {
            services: vec![service("svc-1", "redis"), service("svc-2", "redis")],
        });
        let fetcher = SnapshotFetcher::new(
            ServicePlansSource::new(api, "redis"),
            Duration::from_secs(60),
        );
        let err = fetcher.refresh().await.unwrap_err();
        assert!(err.to_string().contains("found 2"));
        assert!(fetcher.offering().is_none());
    }

    #[tokio::test]
    async fn missing_service_fails_refresh() {
        let api = Arc::new(FakeDirectory { services: vec![] });
        let fetcher = SnapshotFetcher::new(
            ServicePlansSource::new(api, "redis"),
            Duration::from_secs(60),
        );
        assert!(fetcher.refresh().await.is_err());
    }

    #[tokio::test]
    async fn spaces_and_orgs_stores() {
        let api: Arc<dyn DirectoryApi> = Arc::new(FakeDirectory { services: vec![] });
        let spaces = SnapshotFetcher::new(SpacesSource::new(Arc::clone(&api)), Duration::from_secs(60));
        spaces.refresh().await.unwrap();
        assert_eq!(spaces.spaces()[0].name, "dev");

        let orgs = SnapshotFetcher::new(OrgsSource::new(api), Duration::from_secs(60));
        assert!(orgs.refresh().await.is_err());
        assert!(orgs.orgs().is_empty());
    }
}
