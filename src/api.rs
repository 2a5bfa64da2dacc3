//! Wire payloads shared by the controller's fan-out client and the agent's
//! HTTP handlers.

use serde::{Deserialize, Serialize};

use crate::deployment::{AttachKind, MetricKind};

/// Query parameters of `GET /load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadQuery {
    pub name: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: AttachKind,
    pub code: String,
    pub program: String,
}

/// JSON body of `POST /register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub labels: Vec<String>,
    /// Filesystem path of the pinned map the poll scheduler should read.
    pub path: String,
}

/// JSON body of `DELETE /unregister`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub name: String,
}
