//! Hosted-repository API access.
//!
//! The [`RepoHost`] trait is the seam between the pipeline and the hosted
//! service. [`GitHubClient`] implements it against the GitHub REST API with a
//! blocking `reqwest` client; tests use a recording fake instead.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::core::types::{
    CreatedProposal, OpenProposal, ProposalRequest, RepositoryIdentity, RepositoryMetadata,
};

const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

/// Operations the pipeline needs from the hosted service.
pub trait RepoHost {
    /// Default branch and clone URL.
    fn repository(&self, repo: &RepositoryIdentity) -> Result<RepositoryMetadata>;

    /// Commit SHA at the tip of `heads/<branch>`.
    fn resolve_branch_head(&self, repo: &RepositoryIdentity, branch: &str) -> Result<String>;

    /// Every open proposal whose base is `base`, in listing order.
    fn list_open_proposals(&self, repo: &RepositoryIdentity, base: &str)
    -> Result<Vec<OpenProposal>>;

    /// Open a proposal. Must be called at most once per revision.
    fn create_proposal(
        &self,
        repo: &RepositoryIdentity,
        request: &ProposalRequest,
    ) -> Result<CreatedProposal>;
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullSummary {
    number: u64,
    head: PullHead,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// GitHub REST client (`api.github.com` or a GitHub Enterprise base URL).
#[derive(Debug)]
pub struct GitHubClient {
    http: Client,
    base_url: Url,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: &SecretString, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .context("token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("fixbot/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("build http client")?;

        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid API base URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("invalid API base URL '{base_url}'"));
        }

        Ok(Self { http, base_url })
    }

    /// Endpoint URL under the base, one percent-encoded path segment per element.
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid API base URL '{}'", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, method: &str, path: &str, request: RequestBuilder) -> Result<T> {
        debug!(method, path, "api request");
        let response = request
            .send()
            .with_context(|| format!("{method} {path}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(describe_failure(method, path, status, &body)));
        }
        response
            .json::<T>()
            .with_context(|| format!("{method} {path}: decode response"))
    }

    fn get<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        self.send("GET", url.path(), self.http.get(url.clone()).query(query))
    }

    fn repo_url(&self, repo: &RepositoryIdentity, rest: &[&str]) -> Result<Url> {
        let head = ["repos", repo.owner.as_str(), repo.name.as_str()];
        self.url(head.into_iter().chain(rest.iter().copied()))
    }
}

impl RepoHost for GitHubClient {
    #[instrument(skip_all, fields(repo = %repo))]
    fn repository(&self, repo: &RepositoryIdentity) -> Result<RepositoryMetadata> {
        self.get(self.repo_url(repo, &[])?, &[])
    }

    #[instrument(skip_all, fields(repo = %repo, branch))]
    fn resolve_branch_head(&self, repo: &RepositoryIdentity, branch: &str) -> Result<String> {
        // Slashes in a branch name separate ref path components.
        let mut rest = vec!["git", "ref", "heads"];
        rest.extend(branch.split('/'));
        let git_ref: GitRef = self.get(self.repo_url(repo, &rest)?, &[])?;
        Ok(git_ref.object.sha)
    }

    #[instrument(skip_all, fields(repo = %repo, base))]
    fn list_open_proposals(
        &self,
        repo: &RepositoryIdentity,
        base: &str,
    ) -> Result<Vec<OpenProposal>> {
        let url = self.repo_url(repo, &["pulls"])?;
        let mut proposals = Vec::new();
        let mut page = 1usize;
        loop {
            let query = [
                ("state", "open".to_string()),
                ("base", base.to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let batch: Vec<PullSummary> = self.get(url.clone(), &query)?;
            let len = batch.len();
            proposals.extend(batch.into_iter().map(|pull| OpenProposal {
                number: pull.number,
                head_branch: pull.head.ref_name,
            }));
            if len < PER_PAGE {
                break;
            }
            page += 1;
        }
        debug!(count = proposals.len(), pages = page, "listed open proposals");
        Ok(proposals)
    }

    #[instrument(skip_all, fields(repo = %repo, head = %request.head, base = %request.base))]
    fn create_proposal(
        &self,
        repo: &RepositoryIdentity,
        request: &ProposalRequest,
    ) -> Result<CreatedProposal> {
        let url = self.repo_url(repo, &["pulls"])?;
        self.send("POST", url.path(), self.http.post(url.clone()).json(request))
    }
}

/// Render a non-2xx response, preferring the API's own `message`.
fn describe_failure(method: &str, path: &str, status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    if detail.is_empty() {
        format!("{method} {path} returned {status}")
    } else {
        format!("{method} {path} returned {status}: {detail}")
    }
}
