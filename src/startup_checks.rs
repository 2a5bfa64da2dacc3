//! Runtime requirement validation for agent mode.
//!
//! Run before serving traffic and from the `check` subcommand. A missing
//! bpftool is returned as an error; the agent reports it loudly and starts
//! anyway in a degraded state (it can neither load programs nor read maps),
//! while the `check` subcommand exits non-zero. Everything else is warn-only.

use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RequirementError {
    #[error("'{0}' not found in PATH - the agent cannot load programs or read maps")]
    ToolMissing(String),
}

fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Validates the agent's runtime requirements.
pub fn validate_requirements(clang: &str, bpftool: &str) -> Result<(), RequirementError> {
    if !tool_available(bpftool) {
        return Err(RequirementError::ToolMissing(bpftool.to_string()));
    }
    info!("✅ {} available", bpftool);

    if !tool_available(clang) {
        // Polling already-loaded programs still works without a compiler.
        warn!("⚠️  {} not found - load requests will fail", clang);
    } else {
        info!("✅ {} available", clang);
    }

    if !Path::new("/sys/fs/bpf").exists() {
        warn!("⚠️  /sys/fs/bpf not mounted - pinning and map reads will fail");
    }

    if !Path::new("/sys/kernel/btf/vmlinux").exists() {
        warn!("⚠️  /sys/kernel/btf/vmlinux not found - BTF support missing");
    }

    Ok(())
}
