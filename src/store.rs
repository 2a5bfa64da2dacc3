//! Deployment store collaborator.
//!
//! The reconciler persists status through this trait. Versions implement
//! optimistic concurrency: `update_status` fails with `Error::Conflict` when
//! the caller's version is stale, and the reconciler retries with backoff.
//! The bundled implementation keeps everything in memory; deployments are
//! injected through the controller's HTTP surface.

use async_trait::async_trait;
use std::sync::RwLock;

use ahash::AHashMap as HashMap;

use crate::deployment::{Deployment, DeploymentSpec, DeploymentStatus};
use crate::error::{Error, Result};

/// A deployment paired with the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned {
    pub deployment: Deployment,
    pub version: u64,
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn list(&self) -> Vec<Versioned>;

    async fn get(&self, name: &str) -> Option<Versioned>;

    /// Creates or replaces the spec, keeping any existing status. Returns
    /// the new version.
    async fn apply(&self, spec: DeploymentSpec) -> u64;

    /// Persists status against the version the deployment was read at.
    async fn update_status(
        &self,
        name: &str,
        status: DeploymentStatus,
        expected_version: u64,
    ) -> Result<u64>;

    async fn delete(&self, name: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, Versioned>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn list(&self) -> Vec<Versioned> {
        let inner = self.inner.read().unwrap();
        inner.values().cloned().collect()
    }

    async fn get(&self, name: &str) -> Option<Versioned> {
        let inner = self.inner.read().unwrap();
        inner.get(name).cloned()
    }

    async fn apply(&self, spec: DeploymentSpec) -> u64 {
        let mut inner = self.inner.write().unwrap();
        match inner.get_mut(&spec.name) {
            Some(existing) => {
                existing.deployment.spec = spec;
                existing.version += 1;
                existing.version
            }
            None => {
                let name = spec.name.clone();
                inner.insert(
                    name,
                    Versioned {
                        deployment: Deployment::new(spec),
                        version: 1,
                    },
                );
                1
            }
        }
    }

    async fn update_status(
        &self,
        name: &str,
        status: DeploymentStatus,
        expected_version: u64,
    ) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner
            .get_mut(name)
            .ok_or_else(|| Error::not_found("deployment", name))?;
        if entry.version != expected_version {
            return Err(Error::Conflict(name.to_string()));
        }
        entry.deployment.status = status;
        entry.version += 1;
        Ok(entry.version)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("deployment", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{AttachKind, MetricKind, Phase};

    fn spec(name: &str) -> DeploymentSpec {
        DeploymentSpec {
            name: name.into(),
            target: "sys_execve".into(),
            kind: AttachKind::Kprobe,
            code: "int prog() { return 0; }".into(),
            program: "prog".into(),
            help: "help".into(),
            metric_kind: MetricKind::Counter,
            map: "calls".into(),
        }
    }

    #[tokio::test]
    async fn stale_status_update_conflicts() {
        let store = MemoryStore::new();
        let v1 = store.apply(spec("d1")).await;

        let mut status = DeploymentStatus::default();
        status.phase = Phase::Pending;
        let v2 = store.update_status("d1", status.clone(), v1).await.unwrap();
        assert!(v2 > v1);

        let err = store.update_status("d1", status, v1).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn apply_preserves_status() {
        let store = MemoryStore::new();
        let v1 = store.apply(spec("d1")).await;
        let mut status = DeploymentStatus::default();
        status.phase = Phase::Running;
        store.update_status("d1", status, v1).await.unwrap();

        store.apply(spec("d1")).await;
        let stored = store.get("d1").await.unwrap();
        assert_eq!(stored.deployment.status.phase, Phase::Running);
    }
}
