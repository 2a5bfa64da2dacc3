//! Poll scheduler: the node's harvesting loop.
//!
//! One fixed-interval timer per agent process. Each tick snapshots the
//! program registry, reads every complete entry's pinned map through the
//! map-reader collaborator, decodes the dump and dispatches the values into
//! the metric registry. Ticks are awaited inline and missed ticks are
//! skipped, so two ticks can never interleave updates to the same series.
//! A failing map read is logged and the tick moves on to the next entry.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::decode::parse_map_dump;
use crate::deployment::MetricKind;
use crate::mapreader::MapReader;
use crate::registry::{MetricRegistry, ProgramRegistry};

pub struct Poller {
    programs: Arc<ProgramRegistry>,
    metrics: Arc<MetricRegistry>,
    reader: Arc<dyn MapReader>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        programs: Arc<ProgramRegistry>,
        metrics: Arc<MetricRegistry>,
        reader: Arc<dyn MapReader>,
        interval: Duration,
    ) -> Self {
        Self {
            programs,
            metrics,
            reader,
            interval,
        }
    }

    /// Runs until the surrounding task is aborted at shutdown.
    pub async fn run(self) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            self.tick().await;
        }
    }

    /// One harvesting pass over the current program snapshot.
    pub async fn tick(&self) {
        for entry in self.programs.list() {
            let (Some(path), Some(kind)) = (entry.path.as_deref(), entry.kind) else {
                // Loaded but not yet registered; the register round will
                // complete the entry.
                debug!("program '{}' has no map path yet, skipping", entry.name);
                continue;
            };

            let raw = match self.reader.read(path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("reading map for '{}' at {} failed: {:#}", entry.name, path, e);
                    continue;
                }
            };

            let values = parse_map_dump(&raw);
            debug!(
                "program '{}': decoded {} entries from {}",
                entry.name,
                values.len(),
                path
            );
            for (key, value) in values {
                match kind {
                    MetricKind::Counter => self.metrics.add_counter(&entry.name, value, &[&key]),
                    MetricKind::Gauge => self.metrics.set_gauge(&entry.name, value, &[&key]),
                }
            }
        }
    }
}
