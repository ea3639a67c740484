//! Expands an org-scope GitHub `Repository` into concrete Git repositories,
//! following RFC-5988 `Link` header pagination and backing off on
//! rate-limit exhaustion, mirroring [`crate::crawler::gitlab::GitLabProjectEnumerator`].

use crate::error::CrawlError;
use crate::exclusion::glob_excludes;
use crate::models::{Repository, RepositoryKind};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
const TRANSPORT_RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_secs(10);

/// Sends `request`, retrying transport-level failures up to
/// [`MAX_TRANSPORT_ATTEMPTS`] times with a fixed backoff before giving up on
/// this page, mirroring [`crate::crawler::gitlab`]'s enumerator.
async fn send_with_retry(request: reqwest::RequestBuilder) -> Result<reqwest::Response, CrawlError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let this_attempt = request.try_clone().expect("GET requests carry no streaming body");
        match this_attempt.send().await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < MAX_TRANSPORT_ATTEMPTS => {
                warn!(attempt, error = %e, "transient transport error listing github repos, retrying");
                tokio::time::sleep(TRANSPORT_RETRY_BACKOFF).await;
            }
            Err(e) => return Err(CrawlError::TransientTransport(e.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    full_name: String,
    clone_url: String,
}

pub struct GitHubRepoEnumerator {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubRepoEnumerator {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }

    pub async fn enumerate(
        &self,
        org: &str,
        excluded_projects: &[String],
        excluded_name_patterns: &[String],
        access_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Repository>, CrawlError> {
        let mut repositories = Vec::new();
        let mut next_url = Some(format!("{}/orgs/{}/repos?per_page=100", self.base_url.trim_end_matches('/'), org));

        while let Some(url) = next_url {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let mut request = self.client.get(&url).header("Accept", "application/vnd.github+json");
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("Bearer {token}"));
            }

            let response = send_with_retry(request).await?;

            if let Some(remaining) = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
            {
                if remaining == 0 {
                    if let Some(reset_at) = response
                        .headers()
                        .get("x-ratelimit-reset")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<i64>().ok())
                    {
                        sleep_until_reset(reset_at).await;
                    }
                }
            }

            if !response.status().is_success() {
                return Err(CrawlError::RemoteProtocol(format!(
                    "github repos list failed with status {}",
                    response.status()
                )));
            }

            let link_header = response
                .headers()
                .get("link")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            next_url = link_header.as_deref().and_then(parse_next_link);

            let repos: Vec<GitHubRepo> = response
                .json()
                .await
                .map_err(|e| CrawlError::RemoteProtocol(format!("malformed github repos response: {e}")))?;

            for repo in repos {
                if excluded_projects.iter().any(|p| p == &repo.full_name) {
                    debug!(repo = %repo.full_name, "skipping explicitly excluded github repo");
                    continue;
                }
                if excluded_name_patterns.iter().any(|pattern| glob_excludes(pattern, &repo.full_name)) {
                    debug!(repo = %repo.full_name, "skipping github repo matching exclusion pattern");
                    continue;
                }

                let mut materialized = Repository::new(repo.full_name.clone(), RepositoryKind::Git, repo.clone_url);
                materialized.access_token = access_token.map(|t| t.to_string());
                repositories.push(materialized);
            }
        }

        info!(org, count = repositories.len(), "enumerated github repos");
        Ok(repositories)
    }
}

/// Extracts the `rel="next"` URL from an RFC-5988 `Link` header, e.g.
/// `<https://api.github.com/...&page=2>; rel="next", <...>; rel="last"`.
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let part = part.trim();
        if !part.contains("rel=\"next\"") {
            return None;
        }
        let start = part.find('<')? + 1;
        let end = part.find('>')?;
        Some(part[start..end].to_string())
    })
}

async fn sleep_until_reset(reset_epoch_secs: i64) {
    let now = chrono::Utc::now().timestamp();
    let wait = (reset_epoch_secs - now).max(0) as u64;
    if wait > 0 {
        warn!(wait_seconds = wait, "github rate limit exhausted, sleeping until reset");
        tokio::time::sleep(std::time::Duration::from_secs(wait)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_next_link_among_multiple_rels() {
        let header = r#"<https://api.github.com/orgs/x/repos?page=2>; rel="next", <https://api.github.com/orgs/x/repos?page=5>; rel="last""#;
        assert_eq!(parse_next_link(header), Some("https://api.github.com/orgs/x/repos?page=2".to_string()));
    }

    #[test]
    fn returns_none_without_next_rel() {
        let header = r#"<https://api.github.com/orgs/x/repos?page=5>; rel="last""#;
        assert_eq!(parse_next_link(header), None);
    }
}
