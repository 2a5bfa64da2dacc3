//! Error taxonomy shared by the registries, the store and the HTTP handlers.
//!
//! Fan-out call failures and map-dump decode problems deliberately do not
//! appear here: the former are aggregated into success counts, the latter are
//! dropped by the decoder.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request payload, rejected at the HTTP boundary.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Duplicate program name at load time, or a genuine duplicate inside
    /// the metrics exporter (idempotent re-registration is NOT this error).
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Optimistic-concurrency failure when persisting deployment status.
    #[error("stale version while updating '{0}'")]
    Conflict(String),

    #[error("metrics exporter error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

impl Error {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }
}
