//! Compile-and-attach collaborator.
//!
//! The load handler drives this trait; the production implementation writes
//! the declared source to a scratch directory, compiles it with clang for the
//! BPF target and loads it through bpftool, pinning programs and maps under
//! `<pin_root>/<name>/`. Attachment relies on bpftool's autoattach for hook
//! kinds encoded in section names; XDP targets get an explicit device attach.

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deployment::AttachKind;

/// Parameters of one load request, matching the `/load` query surface.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub name: String,
    pub target: String,
    pub kind: AttachKind,
    pub code: String,
    pub program: String,
}

#[async_trait]
pub trait ProgramLoader: Send + Sync {
    /// Compiles and attaches the program, pinning its maps so the poll
    /// scheduler can reach them.
    async fn load(&self, spec: &LoadSpec) -> anyhow::Result<()>;

    /// Detaches and unpins everything belonging to `name`. Absent programs
    /// are fine.
    async fn unload(&self, name: &str) -> anyhow::Result<()>;
}

pub struct CommandLoader {
    clang: String,
    bpftool: String,
    pin_root: String,
    scratch_dir: PathBuf,
}

impl CommandLoader {
    pub fn new(
        clang: impl Into<String>,
        bpftool: impl Into<String>,
        pin_root: impl Into<String>,
    ) -> Self {
        Self {
            clang: clang.into(),
            bpftool: bpftool.into(),
            pin_root: pin_root.into(),
            scratch_dir: std::env::temp_dir().join("bpfleet-build"),
        }
    }

    fn pin_dir(&self, name: &str) -> String {
        format!("{}/{}", self.pin_root, name)
    }

    async fn compile(&self, name: &str, code: &str) -> anyhow::Result<PathBuf> {
        let dir = self.scratch_dir.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .context("creating build scratch directory")?;

        let src = dir.join(format!("{name}.c"));
        let obj = dir.join(format!("{name}.o"));
        tokio::fs::write(&src, code)
            .await
            .context("writing program source")?;

        let output = Command::new(&self.clang)
            .args(["-O2", "-g", "-target", "bpf", "-c"])
            .arg(&src)
            .arg("-o")
            .arg(&obj)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.clang))?;

        if !output.status.success() {
            bail!(
                "compilation of '{name}' failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        debug!("compiled {} -> {}", src.display(), obj.display());
        Ok(obj)
    }

    async fn run_bpftool(&self, args: &[&str]) -> anyhow::Result<()> {
        let output = Command::new(&self.bpftool)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.bpftool))?;
        if !output.status.success() {
            bail!(
                "bpftool {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ProgramLoader for CommandLoader {
    async fn load(&self, spec: &LoadSpec) -> anyhow::Result<()> {
        if spec.kind == AttachKind::Sockfilter {
            bail!("sockfilter attachment needs a socket fd and is not supported here");
        }

        let obj = self.compile(&spec.name, &spec.code).await?;
        let pin_dir = self.pin_dir(&spec.name);

        let obj_str = obj.to_string_lossy();
        self.run_bpftool(&["prog", "loadall", &obj_str, &pin_dir, "autoattach"])
            .await?;

        if spec.kind == AttachKind::Xdp {
            let pinned_prog = format!("{}/{}", pin_dir, spec.program);
            self.run_bpftool(&[
                "net", "attach", "xdp", "pinned", &pinned_prog, "dev", &spec.target,
            ])
            .await?;
        }

        info!(
            "loaded program '{}' ({} on {}), pinned under {}",
            spec.name, spec.kind, spec.target, pin_dir
        );
        Ok(())
    }

    async fn unload(&self, name: &str) -> anyhow::Result<()> {
        let pin_dir = self.pin_dir(name);
        match tokio::fs::remove_dir_all(&pin_dir).await {
            Ok(()) => {
                info!("unpinned '{}' from {}", name, pin_dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing pin directory {pin_dir}")),
        }
    }
}
