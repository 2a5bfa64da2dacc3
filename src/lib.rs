//! bpfleet - fleet orchestration for eBPF instrumentation programs.
//!
//! Two tightly coupled subsystems share this crate:
//!
//! - the **reconciliation engine** ([`reconciler`], [`fanout`], [`store`]):
//!   drives every declared [`deployment`] through its lifecycle by fanning
//!   out load and register calls to all fleet nodes and folding partial
//!   success into status;
//! - the **node telemetry pipeline** ([`registry`], [`poller`], [`decode`]):
//!   per-node registries of attached programs and metric instruments, a
//!   periodic harvesting loop over pinned kernel maps, and a total decoder
//!   for the dump text.
//!
//! The compile+attach step, map reading and deployment persistence are
//! trait seams ([`loader`], [`mapreader`], [`store`]) with command-line and
//! in-memory implementations.

pub mod api;
pub mod cli;
pub mod config;
pub mod decode;
pub mod deployment;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod loader;
pub mod mapreader;
pub mod poller;
pub mod reconciler;
pub mod registry;
pub mod startup_checks;
pub mod state;
pub mod store;

pub use error::{Error, Result};
