//! Fan-out executor tests against real local HTTP servers.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use bpfleet::fanout::FanoutExecutor;

/// Spawns a one-route server answering `/ping` with the given status after
/// an optional delay. Returns its base URL.
async fn spawn_node(status: StatusCode, delay: Duration, hits: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/ping",
        get(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                (status, "pong")
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}

#[tokio::test]
async fn aggregates_partial_success() {
    let hits = Arc::new(AtomicUsize::new(0));
    let nodes = vec![
        spawn_node(StatusCode::OK, Duration::ZERO, Arc::clone(&hits)).await,
        spawn_node(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO, Arc::clone(&hits)).await,
        spawn_node(StatusCode::OK, Duration::ZERO, Arc::clone(&hits)).await,
        // Nothing listens here; connection refused counts as a failure.
        "http://127.0.0.1:1".to_string(),
    ];

    let executor = FanoutExecutor::new(Duration::from_secs(2)).unwrap();
    let outcome = executor
        .execute(&nodes, |client, base| client.get(format!("{base}/ping")))
        .await;

    assert_eq!(outcome.success, 2);
    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.nodes.len(), 2);
    assert_eq!(outcome.ratio(), "2/4");
    // Every reachable node was actually called.
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn one_slow_node_does_not_serialize_the_round() {
    let hits = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(300);
    let mut nodes = Vec::new();
    for _ in 0..4 {
        nodes.push(spawn_node(StatusCode::OK, delay, Arc::clone(&hits)).await);
    }

    let executor = FanoutExecutor::new(Duration::from_secs(2)).unwrap();
    let start = Instant::now();
    let outcome = executor
        .execute(&nodes, |client, base| client.get(format!("{base}/ping")))
        .await;
    let elapsed = start.elapsed();

    assert_eq!(outcome.success, 4);
    // Concurrent calls cost about one delay, nowhere near four.
    assert!(elapsed < delay * 3, "round took {elapsed:?}");
}

#[tokio::test]
async fn per_call_timeout_counts_as_failure() {
    let hits = Arc::new(AtomicUsize::new(0));
    let nodes = vec![
        spawn_node(StatusCode::OK, Duration::from_secs(5), Arc::clone(&hits)).await,
        spawn_node(StatusCode::OK, Duration::ZERO, Arc::clone(&hits)).await,
    ];

    let executor = FanoutExecutor::new(Duration::from_millis(200)).unwrap();
    let outcome = executor
        .execute(&nodes, |client, base| client.get(format!("{base}/ping")))
        .await;

    assert_eq!(outcome.success, 1);
    assert_eq!(outcome.total, 2);
}

#[tokio::test]
async fn empty_node_set_is_a_noop() {
    let executor = FanoutExecutor::new(Duration::from_secs(1)).unwrap();
    let outcome = executor
        .execute(&[], |client, base| client.get(format!("{base}/ping")))
        .await;
    assert_eq!(outcome.success, 0);
    assert_eq!(outcome.total, 0);
    assert!(outcome.all_failed());
}
