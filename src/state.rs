//! Shared state passed into the HTTP handlers and background tasks.
//!
//! Registries are explicit owned objects constructed once per process and
//! handed around by reference; there is no process-global table.

use std::sync::Arc;

use crate::loader::ProgramLoader;
use crate::reconciler::Reconciler;
use crate::registry::{MetricRegistry, ProgramRegistry};
use crate::store::DeploymentStore;

/// State of one agent process, shared between the HTTP surface and the poll
/// scheduler.
pub struct AgentState {
    pub programs: Arc<ProgramRegistry>,
    pub metrics: Arc<MetricRegistry>,
    pub loader: Arc<dyn ProgramLoader>,
}

pub type SharedAgentState = Arc<AgentState>;

/// State of the controller process.
pub struct ControllerState {
    pub store: Arc<dyn DeploymentStore>,
    pub reconciler: Arc<Reconciler>,
}

pub type SharedControllerState = Arc<ControllerState>;
