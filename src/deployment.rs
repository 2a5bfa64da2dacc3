//! Declared deployment types: spec, status, phases and conditions.
//!
//! A deployment describes one instrumentation unit (hook point, attach kind,
//! source code, metric shape) that the controller drives onto every fleet
//! node. Status is owned exclusively by the reconciler; nothing else writes
//! phase or condition fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;

/// Category of kernel hook a program binds to. Closed set; anything else is
/// rejected when the request is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachKind {
    Kprobe,
    Kretprobe,
    Tracepoint,
    Uprobe,
    Uretprobe,
    Xdp,
    Tc,
    Sockfilter,
    CgroupSock,
    Lsm,
}

impl fmt::Display for AttachKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachKind::Kprobe => "kprobe",
            AttachKind::Kretprobe => "kretprobe",
            AttachKind::Tracepoint => "tracepoint",
            AttachKind::Uprobe => "uprobe",
            AttachKind::Uretprobe => "uretprobe",
            AttachKind::Xdp => "xdp",
            AttachKind::Tc => "tc",
            AttachKind::Sockfilter => "sockfilter",
            AttachKind::CgroupSock => "cgroup_sock",
            AttachKind::Lsm => "lsm",
        };
        f.write_str(s)
    }
}

/// Metric instrument kind. Source variants spell this with inconsistent
/// casing ("gauge", "Counter", ...), so parsing is case-insensitive and
/// happens exactly once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(Error::validation(
                "prometheusType",
                format!("expected Gauge or Counter, got '{other}'"),
            )),
        }
    }
}

impl<'de> Deserialize<'de> for MetricKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        MetricKind::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => f.write_str("Gauge"),
            MetricKind::Counter => f.write_str("Counter"),
        }
    }
}

/// Desired state of one instrumentation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub name: String,
    /// Hook point the program attaches to (symbol, tracepoint path, device).
    pub target: String,
    #[serde(rename = "type")]
    pub kind: AttachKind,
    /// eBPF C source text, compiled on each node.
    pub code: String,
    /// Entry-point (program section) name inside the compiled object.
    pub program: String,
    pub help: String,
    #[serde(rename = "prometheusType")]
    pub metric_kind: MetricKind,
    /// Name of the pinned map the program writes into.
    pub map: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Freshly created object; initialized to Pending before any network call.
    #[default]
    #[serde(rename = "")]
    Unset,
    Pending,
    Deploying,
    Running,
    PartiallyRunning,
    Failed,
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MountStatus {
    #[default]
    NotMounted,
    Mounted,
    MountFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForwardingStatus {
    #[default]
    NotStarted,
    Active,
    Failed,
}

/// One observation in the deployment's condition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: bool,
    pub reason: String,
    pub message: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub phase: Phase,
    pub mount_status: MountStatus,
    pub forwarding_status: ForwardingStatus,
    #[serde(default)]
    pub running_nodes: Vec<String>,
    pub node_count: u32,
    pub last_successful_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DeploymentStatus {
    /// Latest-per-type overwrite. The transition time is preserved when the
    /// boolean status does not change.
    pub fn set_condition(
        &mut self,
        kind: &str,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        let now = Utc::now();
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.kind == kind) {
            if existing.status != status {
                existing.time = now;
            }
            existing.status = status;
            existing.reason = reason.into();
            existing.message = message.into();
        } else {
            self.conditions.push(Condition {
                kind: kind.to_string(),
                status,
                reason: reason.into(),
                message: message.into(),
                time: now,
            });
        }
    }

    pub fn condition(&self, kind: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }
}

/// A declared deployment together with its observed status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl Deployment {
    pub fn new(spec: DeploymentSpec) -> Self {
        Self {
            spec,
            status: DeploymentStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Filesystem path the program's map is pinned at on every node,
    /// derived deterministically from the deployment name and map name.
    pub fn pin_path(&self, pin_root: &str) -> String {
        format!("{}/{}/{}", pin_root, self.spec.name, self.spec.map)
    }
}
