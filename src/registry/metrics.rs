//! Per-node metric instrument registry.
//!
//! Two independent name → instrument tables (gauges and counters) backed by
//! one Prometheus registry. Registration is idempotent per table: asking for
//! a name that is already present is a silent success, while a collision
//! inside the Prometheus registry itself (same fully-qualified name with a
//! different shape) is surfaced as an error. Every instrument carries a
//! node-identity label appended last so downstream aggregation can tell the
//! fleet members apart.

use ahash::AHashMap as HashMap;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::RwLock;
use tracing::warn;

use crate::deployment::MetricKind;
use crate::error::Result;

/// Label every instrument gets appended, naming this fleet member.
pub const NODE_LABEL: &str = "node";

pub struct MetricRegistry {
    registry: Registry,
    node: String,
    gauges: RwLock<HashMap<String, GaugeVec>>,
    counters: RwLock<HashMap<String, IntCounterVec>>,
}

impl MetricRegistry {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(),
            node: node.into(),
            gauges: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Registers an instrument of the given kind. The node label is appended
    /// to `labels` before construction.
    pub fn register_metric(
        &self,
        name: &str,
        help: &str,
        kind: MetricKind,
        labels: &[String],
    ) -> Result<()> {
        let mut label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        label_refs.push(NODE_LABEL);

        match kind {
            MetricKind::Gauge => self.register_gauge(name, help, &label_refs),
            MetricKind::Counter => self.register_counter(name, help, &label_refs),
        }
    }

    fn register_gauge(&self, name: &str, help: &str, labels: &[&str]) -> Result<()> {
        let mut gauges = self.gauges.write().unwrap();
        if gauges.contains_key(name) {
            return Ok(());
        }
        let vec = GaugeVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        gauges.insert(name.to_string(), vec);
        Ok(())
    }

    fn register_counter(&self, name: &str, help: &str, labels: &[&str]) -> Result<()> {
        let mut counters = self.counters.write().unwrap();
        if counters.contains_key(name) {
            return Ok(());
        }
        let vec = IntCounterVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        counters.insert(name.to_string(), vec);
        Ok(())
    }

    /// Sets the gauge series for the given label values (node label value
    /// appended). Unknown names and mismatched label counts are logged and
    /// ignored.
    pub fn set_gauge(&self, name: &str, value: u64, label_values: &[&str]) {
        let gauges = self.gauges.read().unwrap();
        let Some(gauge) = gauges.get(name) else {
            warn!("set_gauge: no gauge named '{}' registered, dropping value", name);
            return;
        };
        let mut values: Vec<&str> = label_values.to_vec();
        values.push(&self.node);
        match gauge.get_metric_with_label_values(&values) {
            Ok(series) => series.set(value as f64),
            Err(e) => warn!("set_gauge: '{}' label mismatch, dropping value: {}", name, e),
        }
    }

    /// Adds an unsigned delta to the counter series for the given label
    /// values (node label value appended). Unknown names and mismatched
    /// label counts are logged and ignored.
    pub fn add_counter(&self, name: &str, value: u64, label_values: &[&str]) {
        let counters = self.counters.read().unwrap();
        let Some(counter) = counters.get(name) else {
            warn!("add_counter: no counter named '{}' registered, dropping value", name);
            return;
        };
        let mut values: Vec<&str> = label_values.to_vec();
        values.push(&self.node);
        match counter.get_metric_with_label_values(&values) {
            Ok(series) => series.inc_by(value),
            Err(e) => warn!("add_counter: '{}' label mismatch, dropping value: {}", name, e),
        }
    }

    /// Renders all registered instruments in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::with_capacity(16 * 1024);
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Gathered metric families, for tests and introspection.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}
