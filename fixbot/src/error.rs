//! Tagged pipeline errors.
//!
//! Adapters return `anyhow::Result` with context chains. The pipeline tags
//! each failure with the stage category it belongs to, and `main` maps the
//! category to an exit code.

use thiserror::Error;

use crate::exit_codes;

/// A fatal failure of one pipeline stage.
///
/// Every variant is terminal: nothing is retried and nothing is downgraded.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required input missing at startup, or invalid config file.
    #[error("configuration error: {0:#}")]
    Configuration(anyhow::Error),

    /// Metadata fetch, ref resolution, or proposal listing failed.
    #[error("upstream API error: {0:#}")]
    UpstreamApi(anyhow::Error),

    /// The working copy could not be obtained.
    #[error("clone error: {0:#}")]
    Clone(anyhow::Error),

    /// Local branch, checkout, status, commit, or push failed.
    #[error("git operation error: {0:#}")]
    GitOperation(anyhow::Error),

    /// The fix tool failed to run, timed out, or exited non-zero.
    #[error("execution error: {0:#}")]
    Execution(anyhow::Error),

    /// Creating the change proposal failed.
    #[error("publish error: {0:#}")]
    Publish(anyhow::Error),
}

impl PipelineError {
    /// Process exit code for this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Configuration(_) => exit_codes::CONFIGURATION,
            PipelineError::UpstreamApi(_) => exit_codes::UPSTREAM_API,
            PipelineError::Clone(_) => exit_codes::CLONE,
            PipelineError::GitOperation(_) => exit_codes::GIT_OPERATION,
            PipelineError::Execution(_) => exit_codes::EXECUTION,
            PipelineError::Publish(_) => exit_codes::PUBLISH,
        }
    }

    /// Short stable label, used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::UpstreamApi(_) => "upstream_api",
            PipelineError::Clone(_) => "clone",
            PipelineError::GitOperation(_) => "git_operation",
            PipelineError::Execution(_) => "execution",
            PipelineError::Publish(_) => "publish",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn display_includes_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow!("connection refused"));
        let err = err.context("GET /repos/infra/app").unwrap_err();
        let tagged = PipelineError::UpstreamApi(err);
        assert_eq!(
            tagged.to_string(),
            "upstream API error: GET /repos/infra/app: connection refused"
        );
    }

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let errors = [
            PipelineError::Configuration(anyhow!("x")),
            PipelineError::UpstreamApi(anyhow!("x")),
            PipelineError::Clone(anyhow!("x")),
            PipelineError::GitOperation(anyhow!("x")),
            PipelineError::Execution(anyhow!("x")),
            PipelineError::Publish(anyhow!("x")),
        ];
        let mut codes: Vec<i32> = errors.iter().map(PipelineError::exit_code).collect();
        assert!(codes.iter().all(|code| *code != exit_codes::OK));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
