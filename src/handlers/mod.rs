//! HTTP endpoint handlers.
//!
//! Agent surface (consumed by the controller's fan-out):
//! - `GET /load`: compile and attach a program, insert a registry entry
//! - `POST /register`: register a metric instrument, complete the entry
//! - `DELETE /unregister`: remove the entry
//! - `GET /programs`, `GET /program/{name}`: registry introspection
//! - `GET /metrics`: Prometheus text exposition
//!
//! Controller surface (operator-facing):
//! - `POST /deployments`, `GET /deployments`, `GET /deployments/{name}`,
//!   `DELETE /deployments/{name}`

pub mod agent;
pub mod controller;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::Error;

pub use agent::agent_router;
pub use controller::controller_router;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::AlreadyExists { .. } | Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Prometheus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
