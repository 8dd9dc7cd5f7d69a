//! Periodically refreshed, read-mostly caches of directory collections.
//!
//! Readers always see a complete collection: a refresh builds a new
//! `Arc<Snapshot>` off to the side and swaps the pointer in one step, and a
//! failed refresh leaves the previous snapshot in place.

pub mod stores;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use svcmetrics_core::error::{Result, SvcMetricsError};

pub use stores::{
    OrgsSource, OrgsStore, ServiceOffering, ServicePlansSource, ServicePlansStore, SpacesSource,
    SpacesStore,
};

/// Produces the full collection behind one cache.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + std::fmt::Debug + 'static;

    /// Short name used in logs and errors (`service plans`, `spaces`, ...).
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the directory answered with no collection at all,
    /// which is treated as a failure. An empty `Vec` is a valid result.
    async fn fetch(&self) -> Result<Option<Vec<Self::Item>>>;
}

#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            last_updated: None,
        }
    }
}

pub struct SnapshotFetcher<S: SnapshotSource> {
    source: S,
    schedule: Duration,
    current: RwLock<Arc<Snapshot<S::Item>>>,
}

impl<S: SnapshotSource> SnapshotFetcher<S> {
    pub fn new(source: S, schedule: Duration) -> Self {
        Self {
            source,
            schedule,
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Last good snapshot, or an empty one before the first load.
    pub fn get(&self) -> Arc<Snapshot<S::Item>> {
        Arc::clone(&self.current.read())
    }

    /// Fetch once and swap the result in.
    pub async fn refresh(&self) -> Result<()> {
        let name = self.source.name();
        tracing::info!(collection = name, "refreshing");

        let items = self.source.fetch().await?.ok_or_else(|| {
            SvcMetricsError::Directory(format!("list of {name} was nil"))
        })?;

        tracing::info!(collection = name, number_of_items = items.len(), "refreshed");
        tracing::debug!(collection = name, ?items, "refreshed items");

        let next = Arc::new(Snapshot {
            items,
            last_updated: Some(Utc::now()),
        });
        *self.current.write() = next;
        Ok(())
    }

    /// Initial refresh, then refresh on the schedule until cancelled.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<()> {
        self.refresh().await.map_err(|e| initialising(self.source.name(), e))?;
        self.refresh_loop(cancel).await
    }

    /// Initial refresh inline, then the refresh loop on a spawned task.
    ///
    /// Returns once the cache holds its first snapshot.
    pub async fn start(
        self: &Arc<Self>,
        cancel: watch::Receiver<bool>,
    ) -> Result<JoinHandle<Result<()>>> {
        self.refresh().await.map_err(|e| initialising(self.source.name(), e))?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.refresh_loop(cancel).await }))
    }

    async fn refresh_loop(&self, mut cancel: watch::Receiver<bool>) -> Result<()> {
        let name = self.source.name();
        loop {
            if *cancel.borrow() {
                break;
            }
            tokio::select! {
                changed = cancel.changed() => {
                    // Sender gone counts as shutdown.
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.schedule) => {
                    if let Err(e) = self.refresh().await {
                        tracing::error!(collection = name, error = %e, "refresh failed");
                        return Err(e);
                    }
                }
            }
        }
        tracing::info!(collection = name, "refresh loop stopped");
        Ok(())
    }
}

fn initialising(name: &str, e: SvcMetricsError) -> SvcMetricsError {
    match e {
        SvcMetricsError::Directory(msg) => {
            SvcMetricsError::Directory(format!("initialising {name}: {msg}"))
        }
        other => other,
    }
}
