//! Fixbot configuration loaded from an optional TOML file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Fixbot configuration (TOML).
///
/// Every field has a default, so a missing file or an empty file is a valid
/// configuration. Required per-run inputs (repository, owner, token) come from
/// the environment, not from this file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixbotConfig {
    /// Base URL of the hosted-repository REST API.
    pub api_base_url: String,

    /// Per-request timeout for hosted API calls.
    pub http_timeout_secs: u64,

    /// Timeout applied to every git subprocess (clone and push included).
    pub git_timeout_secs: u64,

    /// Bytes of git stdout/stderr kept in memory for error messages.
    pub git_output_limit_bytes: usize,

    /// Prefix of the deterministic proposal branch (`<prefix><commit>`).
    pub branch_prefix: String,

    /// Parent directory for the disposable working copy. System temp dir if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    pub fix_tool: FixToolConfig,

    pub proposal: ProposalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixToolConfig {
    /// Executable to run in `--fix` mode.
    pub program: PathBuf,
    /// Passed as `--config-file=<config_file>`, relative to `workdir`.
    pub config_file: PathBuf,
    /// Working directory for the tool process.
    pub workdir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for FixToolConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/home/scanner/venv/bin/ansible-lint"),
            config_file: PathBuf::from("./ansible-lint-config.yml"),
            workdir: PathBuf::from("/home/scanner"),
            timeout_secs: 30 * 60,
        }
    }
}

/// Fixed texts and bot identity used when publishing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProposalConfig {
    pub title: String,
    pub body: String,
    pub commit_message: String,
    pub author_name: String,
    pub author_email: String,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            title: "Bot Suggestions".to_string(),
            body: "Bot Suggestions".to_string(),
            commit_message: "bot recommendations".to_string(),
            author_name: "Suggestions Bot".to_string(),
            author_email: "suggestions-bot@users.noreply.github.com".to_string(),
        }
    }
}

impl Default for FixbotConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            http_timeout_secs: 30,
            git_timeout_secs: 10 * 60,
            git_output_limit_bytes: 100_000,
            branch_prefix: "suggestions-".to_string(),
            workspace_root: None,
            fix_tool: FixToolConfig::default(),
            proposal: ProposalConfig::default(),
        }
    }
}

impl FixbotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(anyhow!("api_base_url must be non-empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(anyhow!("http_timeout_secs must be > 0"));
        }
        if self.git_timeout_secs == 0 {
            return Err(anyhow!("git_timeout_secs must be > 0"));
        }
        if self.git_output_limit_bytes == 0 {
            return Err(anyhow!("git_output_limit_bytes must be > 0"));
        }
        validate_branch_prefix(&self.branch_prefix)?;
        if self.fix_tool.program.as_os_str().is_empty() {
            return Err(anyhow!("fix_tool.program must be non-empty"));
        }
        if self.fix_tool.timeout_secs == 0 {
            return Err(anyhow!("fix_tool.timeout_secs must be > 0"));
        }
        let required = [
            ("proposal.title", &self.proposal.title),
            ("proposal.commit_message", &self.proposal.commit_message),
            ("proposal.author_name", &self.proposal.author_name),
            ("proposal.author_email", &self.proposal.author_email),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow!("{field} must be non-empty"));
            }
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn fix_tool_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_tool.timeout_secs)
    }
}

/// The prefix ends up in a ref name, so reject characters git refuses.
fn validate_branch_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(anyhow!("branch_prefix must be non-empty"));
    }
    const FORBIDDEN: [char; 7] = ['~', '^', ':', '?', '*', '[', '\\'];
    if prefix.chars().any(|c| c.is_whitespace() || c.is_control())
        || prefix.contains(FORBIDDEN)
        || prefix.contains("..")
        || prefix.contains("@{")
        || prefix.starts_with('/')
        || prefix.starts_with('-')
        || prefix.starts_with('.')
    {
        return Err(anyhow!(
            "branch_prefix '{prefix}' is not a valid ref name fragment"
        ));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If `path` is `None` or the file is missing, returns `FixbotConfig::default()`.
pub fn load_config(path: Option<&Path>) -> Result<FixbotConfig> {
    let path = match path {
        Some(path) if path.exists() => path,
        _ => {
            let cfg = FixbotConfig::default();
            cfg.validate()?;
            return Ok(cfg);
        }
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FixbotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
