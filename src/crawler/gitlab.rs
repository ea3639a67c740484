//! Expands an org-scope GitLab `Repository` (one whose `url` names a
//! group, not a project) into concrete Git repositories, filtered by the
//! configured exclusion list/patterns and driven through
//! [`crate::crawler::git::GitBranchIndexer`].

use crate::error::CrawlError;
use crate::exclusion::glob_excludes;
use crate::models::{Repository, RepositoryKind};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
const TRANSPORT_RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_secs(10);

/// Sends `request`, retrying transport-level failures (connect timeout, 5xx
/// reset, ...) up to [`MAX_TRANSPORT_ATTEMPTS`] times with a fixed backoff
/// before giving up on this page.
async fn send_with_retry(request: reqwest::RequestBuilder) -> Result<reqwest::Response, CrawlError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let this_attempt = request.try_clone().expect("GET requests carry no streaming body");
        match this_attempt.send().await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < MAX_TRANSPORT_ATTEMPTS => {
                warn!(attempt, error = %e, "transient transport error listing gitlab projects, retrying");
                tokio::time::sleep(TRANSPORT_RETRY_BACKOFF).await;
            }
            Err(e) => return Err(CrawlError::TransientTransport(e.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    #[serde(rename = "path_with_namespace")]
    path_with_namespace: String,
    #[serde(rename = "http_url_to_repo")]
    http_url_to_repo: String,
    /// Browser-facing project URL; absent in older mocked fixtures, so
    /// defaulted rather than failing enumeration over a missing field.
    #[serde(rename = "web_url", default)]
    web_url: Option<String>,
}

pub struct GitLabProjectEnumerator {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitLabProjectEnumerator {
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

    /// Enumerates every project under `group_path`, dropping any whose
    /// fully-qualified path is in `excluded_projects` or matches a glob in
    /// `excluded_name_patterns`, and materializes each survivor as an
    /// ephemeral Git-kind [`Repository`].
    pub async fn enumerate(
        &self,
        group_path: &str,
        excluded_projects: &[String],
        excluded_name_patterns: &[String],
        access_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Repository>, CrawlError> {
        let mut repositories = Vec::new();
        let mut page: Option<String> = Some("1".to_string());

        while let Some(current_page) = page {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let url = format!(
                "{}/api/v4/groups/{}/projects",
                self.base_url.trim_end_matches('/'),
                urlencoding::encode(group_path)
            );
            let mut request = self
                .client
                .get(&url)
                .query(&[("per_page", "100"), ("page", current_page.as_str()), ("include_subgroups", "true")]);
            if let Some(token) = &self.token {
                request = request.header("Private-Token", token);
            }

            let response = send_with_retry(request).await?;
            if !response.status().is_success() {
                return Err(CrawlError::RemoteProtocol(format!(
                    "gitlab projects list failed with status {}",
                    response.status()
                )));
            }

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());

            let projects: Vec<GitLabProject> = response
                .json()
                .await
                .map_err(|e| CrawlError::RemoteProtocol(format!("malformed gitlab projects response: {e}")))?;

            for project in projects {
                if excluded_projects.iter().any(|p| p == &project.path_with_namespace) {
                    debug!(project = %project.path_with_namespace, "skipping explicitly excluded gitlab project");
                    continue;
                }
                if excluded_name_patterns.iter().any(|pattern| glob_excludes(pattern, &project.path_with_namespace)) {
                    debug!(project = %project.path_with_namespace, "skipping gitlab project matching exclusion pattern");
                    continue;
                }

                let mut repo = Repository::new(project.path_with_namespace.clone(), RepositoryKind::Git, project.http_url_to_repo);
                repo.access_token = access_token.map(|t| t.to_string());
                repo.web_url = project.web_url;
                repositories.push(repo);
            }

            page = next_page;
        }

        info!(group = group_path, count = repositories.len(), "enumerated gitlab projects");
        Ok(repositories)
    }
}
