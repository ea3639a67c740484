use super::tree_walker::{GitFileEntry, GitTreeWalker};
use crate::error::CrawlError;
use crate::exclusion::ExclusionPolicy;
use crate::identity::{extract_extension, file_id};
use crate::index::batch::BatchIndexer;
use crate::models::{FileRecord, Repository};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct GitCrawlStats {
    pub branches_processed: usize,
    pub files_processed: usize,
}

/// For a Git repository, for every remote branch, emits one `FileRecord`
/// per file at the branch tip, reading content from the object database
/// directly -- no checkout, so branches can safely be processed one after
/// another without filesystem races.
pub struct GitBranchIndexer<'a> {
    policy: &'a ExclusionPolicy,
}

impl<'a> GitBranchIndexer<'a> {
    pub fn new(policy: &'a ExclusionPolicy) -> Self {
        Self { policy }
    }

    pub async fn index_repository(
        &self,
        repository: &Repository,
        repo_path: &Path,
        indexer: &mut BatchIndexer,
        cancel: &CancellationToken,
    ) -> Result<GitCrawlStats, CrawlError> {
        let repo_path_owned = repo_path.to_owned();
        let mut branches = tokio::task::spawn_blocking(move || {
            let git_repo = gix::open(&repo_path_owned)
                .map_err(|e| CrawlError::RemoteProtocol(e.to_string()))?;
            GitTreeWalker::get_all_branches(&git_repo)
                .map_err(|e| CrawlError::RemoteProtocol(e.to_string()))
        })
        .await
        .map_err(|e| CrawlError::IndexBackendFailure(format!("branch listing task panicked: {e}")))??;

        if branches.is_empty() {
            branches.push(repository.branch.clone().unwrap_or_else(|| "main".to_string()));
        }

        info!(repository = %repository.name, ?branches, "discovered branches");

        let mut stats = GitCrawlStats::default();
        for branch_name in branches {
            if cancel.is_cancelled() {
                break;
            }
            match self
                .index_branch(repository, repo_path, &branch_name, indexer, cancel)
                .await
            {
                Ok(files) => {
                    stats.branches_processed += 1;
                    stats.files_processed += files;
                }
                Err(e) => {
                    warn!(branch = %branch_name, error = %e, "branch indexing failed, continuing with remaining branches");
                }
            }
        }

        Ok(stats)
    }

    async fn index_branch(
        &self,
        repository: &Repository,
        repo_path: &Path,
        branch_name: &str,
        indexer: &mut BatchIndexer,
        cancel: &CancellationToken,
    ) -> Result<usize, CrawlError> {
        let repo_path_owned = repo_path.to_owned();
        let branch_owned = branch_name.to_string();

        let entries = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<GitFileEntry>> {
            let git_repo = gix::open(&repo_path_owned)?;
            let tree_id = GitTreeWalker::get_branch_tree_id(&git_repo, &branch_owned)?;
            GitTreeWalker::walk_tree(&git_repo, &tree_id, "")
        })
        .await
        .map_err(|e| CrawlError::IndexBackendFailure(format!("tree walk task panicked: {e}")))?
        .map_err(|e| CrawlError::RemoteProtocol(e.to_string()))?;

        debug!(branch = %branch_name, files = entries.len(), "walked branch tree");

        let mut processed = 0;
        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }

            let path = Path::new(&entry.path);
            if self.policy.is_file_excluded(path) {
                continue;
            }
            if let Some(parent) = path.parent() {
                if self.policy.any_ancestor_excluded(Path::new(""), parent) {
                    continue;
                }
            }

            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
            let extension = extract_extension(&name);
            let max_file_bytes = self.policy.config().max_file_bytes;

            let repo_path_for_task = repo_path.to_owned();
            let oid = entry.oid;
            let entry_path = entry.path.clone();
            let read_readable = self.policy.is_readable_extension(&extension);

            let content = tokio::task::spawn_blocking(move || -> anyhow::Result<(u64, Option<String>)> {
                let git_repo = gix::open(&repo_path_for_task)?;
                let size = git_repo.find_object(oid)?.data.len() as u64;
                if !read_readable || size > max_file_bytes {
                    return Ok((size, None));
                }
                let content = GitTreeWalker::read_blob_content(&git_repo, &oid)?;
                Ok((size, Some(content)))
            })
            .await
            .map_err(|e| CrawlError::IndexBackendFailure(format!("blob read task panicked: {e}")))?
            .map_err(|e| {
                warn!(path = %entry_path, error = %e, "failed to read git blob");
                e
            });

            let (size, content) = match content {
                Ok(v) => v,
                Err(_) => continue,
            };

            let canonical_path = match &repository.web_url {
                Some(web_url) => format!("{}/-/blob/{}/{}", web_url.trim_end_matches(".git"), branch_name, entry.path),
                None => format!("{}@{}:/{}", repository.url, branch_name, entry.path),
            };
            let (project, version) = (repository.name.clone(), branch_name.to_string());

            let record = FileRecord {
                id: file_id(&canonical_path),
                name,
                path: canonical_path,
                content,
                project,
                version,
                extension,
                size: size as i64,
                last_modified: None,
                last_author: None,
                last_date: None,
            };

            indexer.add(record).await;
            processed += 1;
        }

        Ok(processed)
    }
}
