//! Concurrent fan-out of one HTTP call per fleet node.
//!
//! One task per target node, all sharing a lock-protected tally; the
//! executor waits for every call to finish or time out before returning, so
//! a fan-out costs roughly the slowest node, not the sum. A single node
//! failing (connect error, timeout, non-2xx, unreadable body) is logged and
//! counted; it never cancels the sibling calls. No ordering is guaranteed
//! among results.

use reqwest::{Client, RequestBuilder, Url};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Aggregated result of one fan-out round.
#[derive(Debug, Clone, Default)]
pub struct FanoutOutcome {
    pub success: usize,
    pub total: usize,
    /// Identifiers (URL host components) of the succeeding nodes, in
    /// completion order.
    pub nodes: Vec<String>,
}

impl FanoutOutcome {
    /// "k/n" summary, as recorded in deployment status.
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.success, self.total)
    }

    pub fn all_failed(&self) -> bool {
        self.success == 0
    }
}

pub struct FanoutExecutor {
    client: Client,
}

impl FanoutExecutor {
    /// `timeout` bounds each individual call; there is no round-level
    /// deadline beyond the sum of the individual ones.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Issues `build`'s request once per node base URL, concurrently, and
    /// aggregates the outcome.
    pub async fn execute<F>(&self, nodes: &[String], build: F) -> FanoutOutcome
    where
        F: Fn(&Client, &str) -> RequestBuilder + Send + Sync + 'static,
    {
        let total = nodes.len();
        let tally: Arc<Mutex<(usize, Vec<String>)>> = Arc::new(Mutex::new((0, Vec::new())));
        let build = Arc::new(build);
        let mut calls = JoinSet::new();

        for base in nodes {
            let base = base.clone();
            let client = self.client.clone();
            let tally = Arc::clone(&tally);
            let build = Arc::clone(&build);

            calls.spawn(async move {
                match send_one(&client, &base, build.as_ref()).await {
                    Ok(body) => {
                        debug!("node {} responded: {}", base, body.trim());
                        let id = node_id(&base).unwrap_or_else(|| base.clone());
                        let mut tally = tally.lock().unwrap();
                        tally.0 += 1;
                        tally.1.push(id);
                    }
                    Err(e) => warn!("fan-out call to {} failed: {:#}", base, e),
                }
            });
        }

        while calls.join_next().await.is_some() {}

        let (success, nodes) = {
            let mut tally = tally.lock().unwrap();
            (tally.0, std::mem::take(&mut tally.1))
        };
        FanoutOutcome {
            success,
            total,
            nodes,
        }
    }
}

async fn send_one<F>(client: &Client, base: &str, build: &F) -> anyhow::Result<String>
where
    F: Fn(&Client, &str) -> RequestBuilder,
{
    let response = build(client, base).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        anyhow::bail!("status {status}: {}", body.trim());
    }
    Ok(body)
}

/// Node identity is the host component of the node's base URL.
pub fn node_id(base: &str) -> Option<String> {
    Url::parse(base)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}
