//! Fix tool abstraction.
//!
//! The [`FixTool`] trait decouples the pipeline from the external auto-fixer.
//! The tool is a black-box mutator of the working copy: only its exit status
//! is observed, and its output is forwarded untouched. Tests use scripted
//! tools that edit files directly without spawning processes.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::FixToolConfig;
use crate::io::process::{Echo, run_command_with_timeout};

/// Output is forwarded to our stdio, not kept.
const FORWARD_ONLY: usize = 0;

/// Parameters for one fix tool invocation.
#[derive(Debug, Clone)]
pub struct FixRequest {
    /// Root of the working copy to fix in place.
    pub target: PathBuf,
    /// Maximum time to wait for the tool.
    pub timeout: Duration,
}

/// Abstraction over the auto-fix backend.
pub trait FixTool {
    /// Apply fixes in place under `request.target`.
    ///
    /// `Ok(())` means the tool completed; it may or may not have changed files.
    fn run(&self, request: &FixRequest) -> Result<()>;
}

/// Fix tool run as `<program> --fix --config-file=<config_file> <target>`.
#[derive(Debug, Clone)]
pub struct ExternalFixTool {
    program: PathBuf,
    config_file: PathBuf,
    workdir: PathBuf,
}

impl ExternalFixTool {
    pub fn new(program: PathBuf, config_file: PathBuf, workdir: PathBuf) -> Self {
        Self {
            program,
            config_file,
            workdir,
        }
    }

    pub fn from_config(cfg: &FixToolConfig) -> Self {
        Self::new(
            cfg.program.clone(),
            cfg.config_file.clone(),
            cfg.workdir.clone(),
        )
    }

    fn command(&self, target: &Path) -> Command {
        let mut config_arg = std::ffi::OsString::from("--config-file=");
        config_arg.push(&self.config_file);

        let mut cmd = Command::new(&self.program);
        cmd.arg("--fix")
            .arg(config_arg)
            .arg(target)
            .current_dir(&self.workdir);
        cmd
    }
}

impl FixTool for ExternalFixTool {
    #[instrument(skip_all, fields(program = %self.program.display(), timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &FixRequest) -> Result<()> {
        info!(target = %request.target.display(), "running fix tool");

        let output = run_command_with_timeout(
            self.command(&request.target),
            request.timeout,
            FORWARD_ONLY,
            Echo::Passthrough,
        )
        .with_context(|| format!("run {}", self.program.display()))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "fix tool timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.program.display(),
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "fix tool failed");
            return Err(anyhow!(
                "{} exited with {}",
                self.program.display(),
                output.status
            ));
        }

        debug!("fix tool completed");
        Ok(())
    }
}
