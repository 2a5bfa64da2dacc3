//! bpfleet entry point: dispatches to agent or controller mode and owns
//! process-level concerns (logging, config resolution, graceful shutdown).

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};

use bpfleet::cli::{Args, Commands, LogLevel};
use bpfleet::config::{resolve_config, show_config, validate_effective_config, Config};
use bpfleet::fanout::FanoutExecutor;
use bpfleet::handlers::{agent_router, controller_router};
use bpfleet::loader::CommandLoader;
use bpfleet::mapreader::BpftoolMapReader;
use bpfleet::poller::Poller;
use bpfleet::reconciler::Reconciler;
use bpfleet::registry::{MetricRegistry, ProgramRegistry};
use bpfleet::startup_checks;
use bpfleet::state::{AgentState, ControllerState};
use bpfleet::store::{DeploymentStore, MemoryStore};

/// Initializes tracing logging subsystem. The CLI flag wins over the config
/// file's log-level; the default is info.
fn setup_logging(args: &Args, config: &Config) {
    let level = args
        .log_level
        .or_else(|| config.log_level())
        .unwrap_or(LogLevel::Info);
    let log_level = match level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

async fn serve(
    app: axum::Router,
    addr: SocketAddr,
    what: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("bpfleet {} listening on http://{}", what, addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {}
    }
    Ok(())
}

async fn run_agent(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = startup_checks::validate_requirements(config.clang_path(), config.bpftool_path())
    {
        error!("❌ Startup validation failed: {}", e);
        error!("   The agent will start but may not function correctly!");
    }

    let node_name = config.node_name();
    info!("Starting agent for node '{}'", node_name);

    let programs = Arc::new(ProgramRegistry::new());
    let metrics = Arc::new(MetricRegistry::new(node_name));
    let loader = Arc::new(CommandLoader::new(
        config.clang_path(),
        config.bpftool_path(),
        config.pin_root(),
    ));
    let reader = Arc::new(BpftoolMapReader::new(config.bpftool_path()));

    let poller = Poller::new(
        Arc::clone(&programs),
        Arc::clone(&metrics),
        reader,
        config.poll_interval(),
    );
    let poll_task = tokio::spawn(poller.run());

    let state = Arc::new(AgentState {
        programs,
        metrics,
        loader,
    });
    let addr: SocketAddr = format!("{}:{}", config.bind(), config.agent_port()).parse()?;
    let result = serve(agent_router(state), addr, "agent").await;

    poll_task.abort();
    info!("bpfleet agent stopped gracefully");
    result
}

async fn run_controller(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let nodes = config.nodes();
    if nodes.is_empty() {
        return Err("controller mode needs at least one node address (--node or config)".into());
    }
    info!("Starting controller over {} nodes", nodes.len());

    let store = Arc::new(MemoryStore::new());
    let fanout = FanoutExecutor::new(config.fanout_timeout())?;
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store) as Arc<dyn DeploymentStore>,
        fanout,
        nodes,
        config.pin_root(),
        config.resync_interval(),
        config.failure_backoff(),
    ));

    let reconcile_task = tokio::spawn(Arc::clone(&reconciler).run(config.reconcile_tick()));

    let state = Arc::new(ControllerState {
        store,
        reconciler,
    });
    let addr: SocketAddr = format!("{}:{}", config.bind(), config.controller_port()).parse()?;
    let result = serve(controller_router(state), addr, "controller").await;

    reconcile_task.abort();
    info!("bpfleet controller stopped gracefully");
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = resolve_config(&args)?;
    setup_logging(&args, &config);
    if let Some(path) = &config.source {
        info!("Loaded config file {}", path.display());
    }

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        return show_config(&config, args.config_format);
    }

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    match args.command {
        Commands::Agent {
            port,
            bind,
            node_name,
            poll_interval_secs,
        } => {
            config.agent_port = port.or(config.agent_port);
            config.bind = bind.or(config.bind);
            config.node_name = node_name.or(config.node_name);
            config.poll_interval_secs = poll_interval_secs.or(config.poll_interval_secs);
            run_agent(config).await
        }
        Commands::Controller {
            port,
            bind,
            nodes,
            resync_interval_secs,
        } => {
            config.controller_port = port.or(config.controller_port);
            config.bind = bind.or(config.bind);
            if !nodes.is_empty() {
                config.nodes = Some(nodes);
            }
            config.resync_interval_secs = resync_interval_secs.or(config.resync_interval_secs);
            run_controller(config).await
        }
        Commands::Check => {
            println!("🔍 Checking runtime requirements");
            match startup_checks::validate_requirements(config.clang_path(), config.bpftool_path())
            {
                Ok(()) => {
                    println!("✅ All requirements met");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("❌ Requirements check failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
