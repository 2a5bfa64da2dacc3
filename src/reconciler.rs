//! Reconciliation engine.
//!
//! Drives every declared deployment through its lifecycle by fanning out
//! load and register calls to the configured node set and folding the
//! partial results into status. Reconciliation is continuous and idempotent:
//! every pass re-runs both rounds, so nodes that restarted or lost their
//! maps converge back on the next interval without operator intervention.
//! Partial node failure is recorded, never fatal; only persistence conflicts
//! and payload problems abort a pass, and those are retried with backoff.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use ahash::AHashMap as HashMap;

use crate::api::{RegisterRequest, UnregisterRequest};
use crate::deployment::{ForwardingStatus, MountStatus, Phase};
use crate::error::{Error, Result};
use crate::fanout::FanoutExecutor;
use crate::store::DeploymentStore;

/// Fixed placeholder label carried by every registered instrument; the
/// decoder emits map keys as this label's values.
const KEY_LABEL: &str = "key";

/// Bounded retries when a status write hits a stale version.
const CONFLICT_RETRIES: u32 = 3;

pub struct Reconciler {
    store: Arc<dyn DeploymentStore>,
    fanout: FanoutExecutor,
    /// Externally injected node set; this core performs no discovery.
    nodes: Vec<String>,
    pin_root: String,
    /// Delay before revisiting a deployment after a normal pass.
    resync_interval: Duration,
    /// Delay before retrying a deployment whose load round failed everywhere.
    failure_backoff: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        fanout: FanoutExecutor,
        nodes: Vec<String>,
        pin_root: impl Into<String>,
        resync_interval: Duration,
        failure_backoff: Duration,
    ) -> Self {
        Self {
            store,
            fanout,
            nodes,
            pin_root: pin_root.into(),
            resync_interval,
            failure_backoff,
        }
    }

    /// Runs one reconciliation pass for `name` and returns the delay until
    /// the deployment should be revisited.
    pub async fn reconcile(&self, name: &str) -> Result<Duration> {
        let Some(stored) = self.store.get(name).await else {
            debug!("deployment '{}' is gone, nothing to reconcile", name);
            return Ok(self.resync_interval);
        };
        let deployment = stored.deployment;
        let mut version = stored.version;
        let mut status = deployment.status.clone();

        // A fresh object is initialized and revisited before any network
        // call is attempted.
        if status.phase == Phase::Unset {
            status.phase = Phase::Pending;
            status.mount_status = MountStatus::NotMounted;
            status.forwarding_status = ForwardingStatus::NotStarted;
            status.node_count = 0;
            status.running_nodes.clear();
            self.persist(name, &status, version).await?;
            return Ok(Duration::ZERO);
        }

        status.phase = Phase::Deploying;
        version = self.persist(name, &status, version).await?;

        // Load round: compile+attach on every node.
        let spec = &deployment.spec;
        let load_params: Vec<(String, String)> = vec![
            ("name".into(), spec.name.clone()),
            ("target".into(), spec.target.clone()),
            ("type".into(), spec.kind.to_string()),
            ("code".into(), spec.code.clone()),
            ("program".into(), spec.program.clone()),
        ];
        let mounted = self
            .fanout
            .execute(&self.nodes, move |client, base| {
                client.get(format!("{base}/load")).query(&load_params)
            })
            .await;

        if mounted.all_failed() {
            status.mount_status = MountStatus::MountFailed;
            status.phase = Phase::Failed;
            status.error_message = "failed to mount program on any node".into();
            status.set_condition(
                "Loaded",
                false,
                "LoadFailed",
                format!("loaded program on {} nodes", mounted.ratio()),
            );
            self.persist(name, &status, version).await?;
            warn!(
                "deployment '{}': load round failed on all {} nodes",
                name, mounted.total
            );
            return Ok(self.failure_backoff);
        }

        status.mount_status = MountStatus::Mounted;
        status.set_condition(
            "Loaded",
            true,
            "LoadSucceeded",
            format!("loaded program on {} nodes", mounted.ratio()),
        );

        // Register round: metric instrument + pinned-map path on every node.
        let payload = RegisterRequest {
            name: spec.name.clone(),
            help: spec.help.clone(),
            kind: spec.metric_kind,
            labels: vec![KEY_LABEL.to_string()],
            path: deployment.pin_path(&self.pin_root),
        };
        let registered = self
            .fanout
            .execute(&self.nodes, move |client, base| {
                client.post(format!("{base}/register")).json(&payload)
            })
            .await;

        if registered.all_failed() {
            status.forwarding_status = ForwardingStatus::Failed;
            status.error_message = "failed to register metric forwarding on any node".into();
        } else {
            status.forwarding_status = ForwardingStatus::Active;
        }
        status.set_condition(
            "Registered",
            !registered.all_failed(),
            if registered.all_failed() {
                "RegisterFailed"
            } else {
                "RegisterSucceeded"
            },
            format!("registered metric on {} nodes", registered.ratio()),
        );

        // Final phase is a pure function of the two success counts.
        status.phase = match (mounted.success, registered.success) {
            (m, r) if m > 0 && r > 0 => Phase::Running,
            (m, _) if m > 0 => Phase::PartiallyRunning,
            _ => Phase::Failed,
        };
        match status.phase {
            Phase::Running => {
                status.error_message.clear();
                status.set_condition(
                    "Ready",
                    true,
                    "DeploymentComplete",
                    "program is running and forwarding metrics",
                );
            }
            Phase::PartiallyRunning => {
                status.set_condition(
                    "Ready",
                    false,
                    "ForwardingFailed",
                    "program is mounted but metric forwarding failed",
                );
            }
            _ => {
                status.set_condition("Ready", false, "DeploymentFailed", "deployment failed");
            }
        }

        status.node_count = mounted.nodes.len() as u32;
        status.running_nodes = mounted.nodes.clone();
        status.last_successful_update = Some(chrono::Utc::now());
        status
            .metrics
            .insert("mountSuccess".into(), mounted.ratio());
        status
            .metrics
            .insert("forwardingSuccess".into(), registered.ratio());

        self.persist(name, &status, version).await?;

        info!(
            "reconciled '{}': phase={:?} mount={} forwarding={}",
            name,
            status.phase,
            mounted.ratio(),
            registered.ratio()
        );
        Ok(self.resync_interval)
    }

    /// Best-effort teardown: marks the deployment Terminating, unregisters
    /// it from every node and removes the object.
    pub async fn teardown(&self, name: &str) -> Result<()> {
        if let Some(stored) = self.store.get(name).await {
            let mut status = stored.deployment.status.clone();
            status.phase = Phase::Terminating;
            if let Err(e) = self.persist(name, &status, stored.version).await {
                warn!("could not record Terminating for '{}': {}", name, e);
            }
        }

        let payload = UnregisterRequest {
            name: name.to_string(),
        };
        let outcome = self
            .fanout
            .execute(&self.nodes, move |client, base| {
                client.delete(format!("{base}/unregister")).json(&payload)
            })
            .await;
        info!(
            "unregistered '{}' from {} nodes",
            name,
            outcome.ratio()
        );

        self.store.delete(name).await
    }

    /// Periodic driver: revisits every deployment when its requeue delay has
    /// elapsed. Runs until the surrounding task is aborted at shutdown.
    pub async fn run(self: Arc<Self>, tick: Duration) {
        let mut timer = tokio::time::interval(tick);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut due: HashMap<String, Instant> = HashMap::new();

        loop {
            timer.tick().await;
            let now = Instant::now();
            let listed = self.store.list().await;

            due.retain(|name, _| listed.iter().any(|v| v.deployment.name() == name));

            for stored in listed {
                let name = stored.deployment.name().to_string();
                if due.get(&name).is_some_and(|at| *at > now) {
                    continue;
                }
                match self.reconcile(&name).await {
                    Ok(delay) => {
                        due.insert(name, now + delay);
                    }
                    Err(e) => {
                        error!("reconciliation pass for '{}' failed: {}", name, e);
                        due.insert(name, now + self.resync_interval);
                    }
                }
            }
        }
    }

    /// Persists status, riding out stale-version conflicts with a short
    /// jittered backoff. Conflicts past the retry budget are given up on;
    /// the next pass picks the deployment up again.
    async fn persist(
        &self,
        name: &str,
        status: &crate::deployment::DeploymentStatus,
        mut version: u64,
    ) -> Result<u64> {
        let mut attempt = 0;
        loop {
            match self
                .store
                .update_status(name, status.clone(), version)
                .await
            {
                Ok(next) => return Ok(next),
                Err(Error::Conflict(_)) if attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                    let millis = rand::thread_rng().gen_range(50..250) * u64::from(attempt);
                    debug!(
                        "status conflict for '{}', retry {} in {}ms",
                        name, attempt, millis
                    );
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    match self.store.get(name).await {
                        Some(fresh) => version = fresh.version,
                        None => return Err(Error::not_found("deployment", name)),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
