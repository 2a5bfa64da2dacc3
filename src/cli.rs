//! Command-line interface: global flags plus the agent/controller/check
//! subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

#[derive(Parser, Debug)]
#[command(
    name = "bpfleet",
    about = "Fleet orchestrator for eBPF instrumentation programs with Prometheus metric harvesting",
    long_about = "Fleet orchestrator for eBPF instrumentation programs.\n\n\
                  The controller drives declared deployments onto every fleet node; each node \
                  agent compiles and attaches the programs, polls their pinned kernel maps and \
                  exposes the decoded values as Prometheus metrics.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (overrides the config file; default: info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the per-node telemetry agent
    Agent {
        /// HTTP listen port
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Bind to specific interface/IP
        #[arg(long)]
        bind: Option<String>,

        /// Node label attached to all exported metrics
        #[arg(long)]
        node_name: Option<String>,

        /// Seconds between map harvesting passes
        #[arg(long)]
        poll_interval_secs: Option<u64>,
    },

    /// Run the fleet controller
    Controller {
        /// HTTP listen port
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Bind to specific interface/IP
        #[arg(long)]
        bind: Option<String>,

        /// Agent base URL to fan out to (repeatable)
        #[arg(long = "node")]
        nodes: Vec<String>,

        /// Seconds between reconciliation passes per deployment
        #[arg(long)]
        resync_interval_secs: Option<u64>,
    },

    /// Check runtime requirements (clang, bpftool, bpffs)
    Check,
}
