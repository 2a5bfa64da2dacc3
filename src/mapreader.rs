//! Pinned-map reading collaborator.
//!
//! The poll scheduler only sees the trait; the production implementation
//! shells out to `bpftool map dump pinned <path>` and hands the combined
//! output to the decoder without interpreting it.

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait MapReader: Send + Sync {
    /// Returns the raw dump text for the map pinned at `path`. The format of
    /// the text is not guaranteed.
    async fn read(&self, path: &str) -> anyhow::Result<String>;
}

/// Reads maps through the bpftool binary.
pub struct BpftoolMapReader {
    bpftool: String,
}

impl BpftoolMapReader {
    pub fn new(bpftool: impl Into<String>) -> Self {
        Self {
            bpftool: bpftool.into(),
        }
    }
}

impl Default for BpftoolMapReader {
    fn default() -> Self {
        Self::new("bpftool")
    }
}

#[async_trait]
impl MapReader for BpftoolMapReader {
    async fn read(&self, path: &str) -> anyhow::Result<String> {
        let output = Command::new(&self.bpftool)
            .args(["map", "dump", "pinned", path])
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.bpftool))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            bail!("bpftool map dump {path} failed ({}): {text}", output.status);
        }
        Ok(text)
    }
}
