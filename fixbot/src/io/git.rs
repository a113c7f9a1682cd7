//! Git adapter for the working copy.
//!
//! Every operation shells out to `git` with a timeout. The access token is
//! handed to git through an inline credential helper that reads it from the
//! child environment, so it never appears in argv, in the remote URL, or in
//! `.git/config`.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use crate::io::process::{CommandOutput, Echo, run_command_with_timeout};

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;
const UNBOUNDED: usize = usize::MAX;

const TOKEN_ENV: &str = "FIXBOT_GIT_TOKEN";
/// Answers `get` with the token from [`TOKEN_ENV`]; GitHub ignores the username.
const CREDENTIAL_HELPER: &str = "!f() { test \"$1\" = get || return 0; \
     echo username=x-access-token; echo \"password=${FIXBOT_GIT_TOKEN}\"; }; f";

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Author and committer identity for bot commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    token: Option<SecretString>,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, output_limit_bytes: usize) -> Self {
        self.output_limit_bytes = output_limit_bytes;
        self
    }

    /// Authenticate remote operations (clone, ls-remote, push) with `token`.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Shallow, single-branch clone of `branch` from `url` into the (empty) workdir.
    #[instrument(skip_all, fields(branch))]
    pub fn clone_shallow(&self, url: &str, branch: &str) -> Result<()> {
        debug!(branch, "cloning repository (depth 1)");
        self.run_checked_echo(
            &[
                "clone",
                "--progress",
                "--depth",
                "1",
                "--single-branch",
                "--branch",
                branch,
                "--",
                url,
                ".",
            ],
            Echo::Stdout,
        )?;
        Ok(())
    }

    /// Return the full SHA of `HEAD`.
    pub fn head_commit(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Create a branch at current HEAD and check it out.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Get status entries (including untracked) in NUL-separated porcelain format.
    ///
    /// Captured without the output limit: the entries become the proposal's
    /// changed paths and must be complete.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let args = ["status", "--porcelain=v1", "-z", "-uall"];
        let output = self.execute_limited(self.command(&args), &args, Echo::Silent, UNBOUNDED)?;
        parse_status_z(&output.stdout_lossy())
    }

    /// Stage all changes, new files included (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit staged changes as `signature`, timestamped `when`.
    ///
    /// The signature is used for both author and committer so the commit does
    /// not depend on the host's git identity.
    #[instrument(skip_all, fields(author = %signature.name))]
    pub fn commit_as(&self, message: &str, signature: &Signature, when: DateTime<Utc>) -> Result<()> {
        let date = when.to_rfc2822();
        let envs = [
            ("GIT_AUTHOR_NAME", signature.name.as_str()),
            ("GIT_AUTHOR_EMAIL", signature.email.as_str()),
            ("GIT_AUTHOR_DATE", date.as_str()),
            ("GIT_COMMITTER_NAME", signature.name.as_str()),
            ("GIT_COMMITTER_EMAIL", signature.email.as_str()),
            ("GIT_COMMITTER_DATE", date.as_str()),
        ];
        debug!(%date, "committing staged changes");
        let mut cmd = self.command(&["-c", "commit.gpgsign=false", "commit", "-m", message]);
        cmd.envs(envs);
        self.execute(cmd, &["commit"], Echo::Silent)?;
        Ok(())
    }

    /// True if `remote` already has `refs/heads/<branch>`.
    pub fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool> {
        let refname = format!("refs/heads/{branch}");
        let out = self.run_capture(&["ls-remote", "--heads", remote, &refname])?;
        Ok(out.lines().any(|line| line.trim_end().ends_with(&refname)))
    }

    /// Push local `branch` to the same name on `remote`.
    #[instrument(skip_all, fields(remote, branch, force))]
    pub fn push_branch(&self, remote: &str, branch: &str, force: bool) -> Result<()> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let mut args = vec!["push", "--progress"];
        if force {
            args.push("--force");
        }
        args.push(remote);
        args.push(&refspec);
        debug!(remote, branch, force, "pushing branch");
        self.run_checked_echo(&args, Echo::Stdout)?;
        Ok(())
    }

    /// Environment that wires the credential helper to the token.
    ///
    /// The empty first `credential.helper` resets any helpers configured on
    /// the host so that only this one answers.
    fn auth_env(&self) -> Vec<(&'static str, String)> {
        let mut envs = vec![("GIT_TERMINAL_PROMPT", "0".to_string())];
        if let Some(token) = &self.token {
            envs.extend([
                ("GIT_CONFIG_COUNT", "2".to_string()),
                ("GIT_CONFIG_KEY_0", "credential.helper".to_string()),
                ("GIT_CONFIG_VALUE_0", String::new()),
                ("GIT_CONFIG_KEY_1", "credential.helper".to_string()),
                ("GIT_CONFIG_VALUE_1", CREDENTIAL_HELPER.to_string()),
                (TOKEN_ENV, token.expose_secret().to_string()),
            ]);
        }
        envs
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.workdir)
            .envs(self.auth_env());
        cmd
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(output.stdout_lossy())
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_checked_echo(args, Echo::Silent)
    }

    fn run_checked_echo(&self, args: &[&str], echo: Echo) -> Result<CommandOutput> {
        self.execute(self.command(args), args, echo)
    }

    fn execute(&self, cmd: Command, args: &[&str], echo: Echo) -> Result<CommandOutput> {
        self.execute_limited(cmd, args, echo, self.output_limit_bytes)
    }

    fn execute_limited(
        &self,
        cmd: Command,
        args: &[&str],
        echo: Echo,
        output_limit_bytes: usize,
    ) -> Result<CommandOutput> {
        let label = args.join(" ");
        let output = run_command_with_timeout(cmd, self.timeout, output_limit_bytes, echo)
            .with_context(|| format!("run git {label}"))?;
        if output.timed_out {
            return Err(anyhow!("git {label} timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "git {label} failed ({}): {}{}",
                output.status,
                output.stderr_lossy().trim(),
                output.stderr_truncated_notice("git")
            ));
        }
        Ok(output)
    }
}

/// Parse `status --porcelain=v1 -z` output.
///
/// Each record is `XY <path>\0`; renames and copies are followed by one more
/// `<source>\0` field, which is skipped. Paths are raw (never quoted).
fn parse_status_z(out: &str) -> Result<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    let mut fields = out.split('\0').filter(|field| !field.is_empty());
    while let Some(record) = fields.next() {
        let (code, path) = match (record.get(..2), record.get(2..3), record.get(3..)) {
            (Some(code), Some(" "), Some(path)) if !path.is_empty() => (code, path),
            _ => return Err(anyhow!("unexpected porcelain record: '{record}'")),
        };
        if code.contains(['R', 'C']) && fields.next().is_none() {
            return Err(anyhow!("porcelain record '{record}' is missing its source path"));
        }
        entries.push(StatusEntry {
            code: code.to_string(),
            path: path.to_string(),
        });
    }
    Ok(entries)
}
