//! Configuration management.
//!
//! Configuration is merged from three layers, strongest first: CLI flags,
//! an optional config file (YAML, JSON or TOML, picked by extension), and
//! built-in defaults. The node set the controller fans out to is pure
//! configuration; there is no discovery mechanism.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{Args, ConfigFormat, LogLevel};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_AGENT_PORT: u16 = 8080;
pub const DEFAULT_CONTROLLER_PORT: u16 = 8081;
pub const DEFAULT_PIN_ROOT: &str = "/sys/fs/bpf";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_FAILURE_BACKOFF_SECS: u64 = 300;
pub const DEFAULT_FANOUT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RECONCILE_TICK_SECS: u64 = 5;

/// Paths probed when no explicit --config is given.
const DEFAULT_CONFIG_PATHS: &[&str] = &["bpfleet.yaml", "/etc/bpfleet/bpfleet.yaml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind: Option<String>,
    #[serde(alias = "agent-port")]
    pub agent_port: Option<u16>,
    #[serde(alias = "controller-port")]
    pub controller_port: Option<u16>,

    /// Label value identifying this fleet member on every exported series.
    #[serde(alias = "node-name")]
    pub node_name: Option<String>,

    /// Agent base URLs the controller fans out to.
    pub nodes: Option<Vec<String>>,

    // Harvesting
    #[serde(alias = "pin-root")]
    pub pin_root: Option<String>,
    #[serde(alias = "poll-interval-secs")]
    pub poll_interval_secs: Option<u64>,

    // Reconciliation
    #[serde(alias = "resync-interval-secs")]
    pub resync_interval_secs: Option<u64>,
    #[serde(alias = "failure-backoff-secs")]
    pub failure_backoff_secs: Option<u64>,
    #[serde(alias = "fanout-timeout-secs")]
    pub fanout_timeout_secs: Option<u64>,
    #[serde(alias = "reconcile-tick-secs")]
    pub reconcile_tick_secs: Option<u64>,

    // Toolchain
    #[serde(alias = "clang-path")]
    pub clang_path: Option<String>,
    #[serde(alias = "bpftool-path")]
    pub bpftool_path: Option<String>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    /// File this config was loaded from, if any. Not part of the config
    /// itself.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn agent_port(&self) -> u16 {
        self.agent_port.unwrap_or(DEFAULT_AGENT_PORT)
    }

    pub fn controller_port(&self) -> u16 {
        self.controller_port.unwrap_or(DEFAULT_CONTROLLER_PORT)
    }

    pub fn node_name(&self) -> String {
        self.node_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown-node".to_string())
    }

    pub fn nodes(&self) -> Vec<String> {
        self.nodes.clone().unwrap_or_default()
    }

    pub fn pin_root(&self) -> &str {
        self.pin_root.as_deref().unwrap_or(DEFAULT_PIN_ROOT)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(
            self.resync_interval_secs
                .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS),
        )
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(
            self.failure_backoff_secs
                .unwrap_or(DEFAULT_FAILURE_BACKOFF_SECS),
        )
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_secs(
            self.fanout_timeout_secs
                .unwrap_or(DEFAULT_FANOUT_TIMEOUT_SECS),
        )
    }

    pub fn reconcile_tick(&self) -> Duration {
        Duration::from_secs(
            self.reconcile_tick_secs
                .unwrap_or(DEFAULT_RECONCILE_TICK_SECS),
        )
    }

    pub fn clang_path(&self) -> &str {
        self.clang_path.as_deref().unwrap_or("clang")
    }

    pub fn bpftool_path(&self) -> &str {
        self.bpftool_path.as_deref().unwrap_or("bpftool")
    }

    /// Config-file log level, parsed case-insensitively. The CLI flag takes
    /// precedence; unparseable strings are caught by validation.
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
            .as_deref()
            .and_then(|s| LogLevel::from_str(s, true).ok())
    }
}

fn load_config_file(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("cannot read config file {}: {e}", path.display()))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let config = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&raw)?,
        "json" => serde_json::from_str(&raw)?,
        "toml" => toml::from_str(&raw)?,
        other => return Err(format!("unsupported config format '{other}'").into()),
    };
    Ok(config)
}

/// Loads the config file (explicit path or first default location found).
/// Records the chosen path in `source` so the caller can log it once the
/// subscriber is installed.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    if let Some(path) = &args.config {
        let mut config = load_config_file(path)?;
        config.source = Some(path.clone());
        return Ok(config);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(candidate);
        if path.exists() {
            let mut config = load_config_file(&path)?;
            config.source = Some(path);
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Checks constraints the individual getters cannot express.
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.poll_interval_secs == Some(0) {
        return Err("poll-interval-secs must be greater than zero".into());
    }
    if cfg.fanout_timeout_secs == Some(0) {
        return Err("fanout-timeout-secs must be greater than zero".into());
    }
    if let Some(nodes) = &cfg.nodes {
        for node in nodes {
            if crate::fanout::node_id(node).is_none() {
                return Err(format!("node address '{node}' is not a valid URL").into());
            }
        }
    }
    if cfg.log_level.is_some() && cfg.log_level().is_none() {
        return Err(format!(
            "log-level '{}' is not one of off/error/warn/info/debug/trace",
            cfg.log_level.as_deref().unwrap_or("")
        )
        .into());
    }
    Ok(())
}

/// Prints the effective config in the requested format.
pub fn show_config(
    cfg: &Config,
    format: ConfigFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(cfg)?,
        ConfigFormat::Json => serde_json::to_string_pretty(cfg)?,
        ConfigFormat::Toml => toml::to_string_pretty(cfg)?,
    };
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::default();
        assert_eq!(cfg.agent_port(), DEFAULT_AGENT_PORT);
        assert_eq!(cfg.pin_root(), "/sys/fs/bpf");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
        assert!(cfg.nodes().is_empty());
    }

    #[test]
    fn rejects_invalid_node_urls() {
        let cfg = Config {
            nodes: Some(vec!["http://10.0.0.1:8080".into(), "not a url".into()]),
            ..Default::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn file_log_level_is_parsed_case_insensitively() {
        let cfg = Config {
            log_level: Some("Debug".into()),
            ..Default::default()
        };
        assert_eq!(cfg.log_level(), Some(LogLevel::Debug));
        assert!(validate_effective_config(&cfg).is_ok());

        let cfg = Config {
            log_level: Some("loud".into()),
            ..Default::default()
        };
        assert_eq!(cfg.log_level(), None);
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn loads_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bpfleet.yaml");
        fs::write(
            &path,
            "node-name: agent-1\nnodes:\n  - http://10.0.0.1:8080\npoll-interval-secs: 5\n",
        )
        .unwrap();

        let cfg = load_config_file(&path).unwrap();
        assert_eq!(cfg.node_name(), "agent-1");
        assert_eq!(cfg.nodes(), vec!["http://10.0.0.1:8080".to_string()]);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
    }
}
