//! Required operating parameters read from the process environment.

use anyhow::{Result, anyhow};
use secrecy::SecretString;

use crate::core::types::RepositoryIdentity;

/// Target repository name.
pub const REPOSITORY_VAR: &str = "REPOSITORY";
/// Owning account or organization.
pub const OWNER_VAR: &str = "OWNER";
/// Access token for both the hosted API and git transport.
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Resolved environment: target repository plus credential.
///
/// `Debug` never prints the token.
#[derive(Debug)]
pub struct Environment {
    pub repository: RepositoryIdentity,
    pub token: SecretString,
}

impl Environment {
    /// Resolve from the real process environment.
    pub fn from_process() -> Result<Self> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolve through `lookup`, reporting every missing or blank variable at once.
    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str, missing: &mut Vec<&'static str>| {
            match lookup(name).map(|value| value.trim().to_string()) {
                Some(value) if !value.is_empty() => value,
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let mut missing = Vec::new();
        let name = read(REPOSITORY_VAR, &mut missing);
        let owner = read(OWNER_VAR, &mut missing);
        let token = read(TOKEN_VAR, &mut missing);

        if !missing.is_empty() {
            return Err(anyhow!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            ));
        }

        Ok(Self {
            repository: RepositoryIdentity::new(owner, name),
            token: SecretString::from(token),
        })
    }
}
