//! Per-node registries shared between the HTTP handlers and the poll
//! scheduler: attached programs and their metric instruments.

pub mod metrics;
pub mod programs;

pub use metrics::MetricRegistry;
pub use programs::{ProgramEntry, ProgramRegistry};
