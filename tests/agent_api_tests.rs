//! End-to-end tests of the agent HTTP surface with a stub loader.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use bpfleet::handlers::agent_router;
use bpfleet::loader::{LoadSpec, ProgramLoader};
use bpfleet::registry::{MetricRegistry, ProgramRegistry};
use bpfleet::state::AgentState;

#[derive(Default)]
struct StubLoader {
    loads: AtomicUsize,
    unloads: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ProgramLoader for StubLoader {
    async fn load(&self, _spec: &LoadSpec) -> anyhow::Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("clang exploded");
        }
        Ok(())
    }

    async fn unload(&self, _name: &str) -> anyhow::Result<()> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn spawn_agent(loader: Arc<StubLoader>) -> (String, Arc<AgentState>) {
    let state = Arc::new(AgentState {
        programs: Arc::new(ProgramRegistry::new()),
        metrics: Arc::new(MetricRegistry::new("test-node")),
        loader,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let app = agent_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{}", addr.port()), state)
}

fn load_url(base: &str, name: &str) -> String {
    format!(
        "{base}/load?name={name}&target=sys_execve&type=kprobe&code=int%20p()%20%7B%7D&program=trace"
    )
}

#[tokio::test]
async fn load_register_unregister_round_trip() {
    let loader = Arc::new(StubLoader::default());
    let (base, state) = spawn_agent(Arc::clone(&loader)).await;
    let client = reqwest::Client::new();

    // Load: compiles, attaches, inserts the entry.
    let resp = client.get(load_url(&base, "execve")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert!(state.programs.get("execve").is_some());

    // Duplicate load is a failure.
    let resp = client.get(load_url(&base, "execve")).send().await.unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

    // Register completes the entry and is idempotent.
    let payload = serde_json::json!({
        "name": "execve",
        "help": "execve calls",
        "type": "Counter",
        "labels": ["key"],
        "path": "/sys/fs/bpf/execve/calls",
    });
    for _ in 0..2 {
        let resp = client
            .post(format!("{base}/register"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let entry: serde_json::Value = client
        .get(format!("{base}/program/execve"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry["path"], "/sys/fs/bpf/execve/calls");
    assert_eq!(entry["type"], "Counter");

    let programs: Vec<serde_json::Value> = client
        .get(format!("{base}/programs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(programs.len(), 1);

    // Unregister is idempotent and unloads.
    for _ in 0..2 {
        let resp = client
            .delete(format!("{base}/unregister"))
            .json(&serde_json::json!({"name": "execve"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    assert!(state.programs.get("execve").is_none());
    assert!(loader.unloads.load(Ordering::SeqCst) >= 1);

    // Unknown program reads back as an empty object.
    let entry: serde_json::Value = client
        .get(format!("{base}/program/execve"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry, serde_json::json!({}));
}

#[tokio::test]
async fn loader_failure_leaves_no_entry() {
    let loader = Arc::new(StubLoader {
        fail: true,
        ..Default::default()
    });
    let (base, state) = spawn_agent(Arc::clone(&loader)).await;
    let client = reqwest::Client::new();

    let resp = client.get(load_url(&base, "boom")).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    assert!(state.programs.get("boom").is_none());
}

#[tokio::test]
async fn invalid_attach_kind_is_rejected() {
    let loader = Arc::new(StubLoader::default());
    let (base, state) = spawn_agent(Arc::clone(&loader)).await;
    let client = reqwest::Client::new();

    let url =
        format!("{base}/load?name=x&target=t&type=perf_event&code=c&program=p");
    let resp = client.get(url).send().await.unwrap();
    assert!(resp.status().is_client_error());
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    assert!(state.programs.get("x").is_none());
}

#[tokio::test]
async fn invalid_metric_kind_is_rejected() {
    let loader = Arc::new(StubLoader::default());
    let (base, _state) = spawn_agent(loader).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/register"))
        .json(&serde_json::json!({
            "name": "m",
            "help": "h",
            "type": "Histogram",
            "labels": ["key"],
            "path": "/sys/fs/bpf/m/map",
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn metrics_endpoint_serves_harvested_values() {
    let loader = Arc::new(StubLoader::default());
    let (base, state) = spawn_agent(loader).await;
    let client = reqwest::Client::new();

    state
        .metrics
        .register_metric(
            "execve",
            "execve calls",
            bpfleet::deployment::MetricKind::Counter,
            &["key".to_string()],
        )
        .unwrap();
    state.metrics.add_counter("execve", 8, &["bash"]);

    let body = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("# HELP execve execve calls"), "{body}");
    assert!(
        body.contains("execve{key=\"bash\",node=\"test-node\"} 8"),
        "{body}"
    );
}
