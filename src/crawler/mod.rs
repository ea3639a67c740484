pub mod filesystem;
pub mod git;
pub mod github;
pub mod gitlab;
pub mod svn;

use crate::config::CrawlerConfig;
use crate::encryption::EncryptionService;
use crate::error::CrawlError;
use crate::exclusion::ExclusionPolicy;
use crate::index::{IndexLifecycle, RepoIndex};
use crate::index::batch::BatchIndexer;
use crate::models::{Repository, RepositoryKind};
use crate::progress::{CrawlStatus, ProgressTracker};
use chrono::{DateTime, Utc};
use filesystem::FilesystemWalker;
use git::{GitBranchIndexer, GitOperations};
use github::GitHubRepoEnumerator;
use gitlab::GitLabProjectEnumerator;
use std::collections::HashMap;
use std::sync::Arc;
use svn::{SvnClient, SvnIncrementalDriver};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Outcome of one supervised crawl, returned to the caller for persistence
/// onto its own `Repository` row (new SVN revision, failed-document count,
/// final status, and the bookkeeping an org-scope crawl needs to resume).
#[derive(Debug)]
pub struct CrawlOutcome {
    pub status: CrawlStatus,
    pub files_processed: usize,
    pub files_indexed: usize,
    pub files_failed: usize,
    /// New SVN high-water mark, if this was an SVN crawl.
    pub new_revision: Option<i64>,
    /// Last project name attempted by a GitLab/GitHub org crawl, so a
    /// cancelled or partially-failed crawl can resume from there.
    pub last_processed_project: Option<String>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub error: Option<String>,
}

impl CrawlOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            status: CrawlStatus::Failed,
            files_processed: 0,
            files_indexed: 0,
            files_failed: 0,
            new_revision: None,
            last_processed_project: None,
            last_crawled_at: None,
            duration_seconds: None,
            error: Some(error.into()),
        }
    }
}

/// Runs one [`Repository`] through the backend matching its
/// [`RepositoryKind`], publishing progress as it goes, and enforces a
/// single active crawl per repository id plus a wall-clock timeout that
/// resolves to `cancelled` rather than `failed`.
pub struct CrawlerSupervisor {
    config: CrawlerConfig,
    index_lifecycle: IndexLifecycle,
    git_operations: GitOperations,
    encryption_service: Arc<EncryptionService>,
    progress: Arc<ProgressTracker>,
    active: Arc<RwLock<HashMap<uuid::Uuid, CancellationToken>>>,
}

impl CrawlerSupervisor {
    pub fn new(
        config: CrawlerConfig,
        index_root: impl Into<std::path::PathBuf>,
        encryption_service: Arc<EncryptionService>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            config,
            index_lifecycle: IndexLifecycle::new(index_root),
            git_operations: GitOperations::new(encryption_service.clone()),
            encryption_service,
            progress,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Runs `repository` to completion. Rejects a second concurrent crawl
    /// of the same repository id outright rather than queueing it.
    pub async fn crawl(&self, repository: &Repository) -> CrawlOutcome {
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.write().await;
            if active.contains_key(&repository.id) {
                warn!(repository = %repository.name, "rejecting crawl: already in progress for this repository");
                return CrawlOutcome::failed("a crawl is already active for this repository");
            }
            active.insert(repository.id, cancel.clone());
        }

        let outcome = self.crawl_inner(repository, cancel).await;

        self.active.write().await.remove(&repository.id);
        outcome
    }

    /// Requests cancellation of an in-flight crawl for `repository_id`.
    /// Returns `false` if no crawl is currently active for that id.
    /// Callers must await the crawl's completion themselves; this only
    /// signals, it does not block on the backend unwinding.
    pub async fn stop(&self, repository_id: uuid::Uuid) -> bool {
        match self.active.read().await.get(&repository_id) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    async fn crawl_inner(&self, repository: &Repository, cancel: CancellationToken) -> CrawlOutcome {
        let started = std::time::Instant::now();
        self.progress.start_crawl(repository.id, repository.name.clone()).await;
        self.progress.update_status(repository.id, CrawlStatus::Starting).await;

        let timeout_task = repository.max_crawl_duration_minutes.map(|minutes| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(minutes as u64 * 60)).await;
                cancel.cancel();
            })
        });

        let policy = ExclusionPolicy::new(self.config.clone());
        let repo_index = match self.index_lifecycle.open_or_create(repository).await {
            Ok(idx) => idx,
            Err(e) => {
                error!(repository = %repository.name, error = %e, "failed to open index");
                self.progress.set_error(repository.id, e.to_string()).await;
                if let Some(t) = timeout_task {
                    t.abort();
                }
                return CrawlOutcome {
                    last_crawled_at: Some(Utc::now()),
                    duration_seconds: Some(started.elapsed().as_secs() as i64),
                    ..CrawlOutcome::failed(e.to_string())
                };
            }
        };

        let outcome = self.run_backend(repository, &policy, repo_index, &cancel).await;

        if let Some(t) = timeout_task {
            t.abort();
        }

        let final_status = if cancel.is_cancelled() {
            CrawlStatus::Cancelled
        } else if outcome.error.is_some() {
            CrawlStatus::Failed
        } else {
            CrawlStatus::Completed
        };
        self.progress.update_status(repository.id, final_status.clone()).await;
        if outcome.files_failed > 0 {
            self.progress.record_failed_documents(repository.id, outcome.files_failed).await;
        }

        CrawlOutcome {
            status: final_status,
            last_crawled_at: Some(Utc::now()),
            duration_seconds: Some(started.elapsed().as_secs() as i64),
            ..outcome
        }
    }

    async fn run_backend(
        &self,
        repository: &Repository,
        policy: &ExclusionPolicy,
        repo_index: RepoIndex,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let mut indexer = BatchIndexer::new(repo_index.clone(), self.config.batch_size);

        let result = match repository.kind {
            RepositoryKind::FileSystem => self.run_filesystem(repository, policy, &repo_index, &mut indexer, cancel).await,
            RepositoryKind::Git => self.run_git(repository, policy, &repo_index, &mut indexer, cancel).await,
            RepositoryKind::Svn => self.run_svn(repository, policy, &mut indexer, cancel).await,
            RepositoryKind::GitLab => self.run_gitlab(repository, policy, &repo_index, cancel).await,
            RepositoryKind::GitHub => self.run_github(repository, policy, &repo_index, cancel).await,
        };

        self.progress.update_status(repository.id, CrawlStatus::Indexing).await;
        indexer.flush().await;
        if let Err(e) = repo_index.commit().await {
            warn!(repository = %repository.name, error = %e, "final commit after crawl failed");
        }

        match result {
            Ok(mut outcome) => {
                outcome.files_indexed += indexer.files_indexed();
                outcome.files_failed += indexer.files_failed();
                outcome
            }
            Err(e) => {
                let mut outcome = CrawlOutcome::failed(e.to_string());
                outcome.files_indexed = indexer.files_indexed();
                outcome.files_failed = indexer.files_failed();
                outcome
            }
        }
    }

    async fn run_filesystem(
        &self,
        repository: &Repository,
        policy: &ExclusionPolicy,
        repo_index: &RepoIndex,
        indexer: &mut BatchIndexer,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        self.progress.update_status(repository.id, CrawlStatus::Processing).await;
        repo_index.delete_all_documents().await?;

        let walker = FilesystemWalker::new(repository.url.clone(), policy, cancel.clone());
        let total = walker.count();
        self.progress.update_progress(repository.id, 0, Some(total), 0).await;

        let result = walker.ingest(indexer, self.config.max_symlink_depth).await;
        self.progress
            .update_progress(repository.id, result.files_processed, Some(result.files_total), indexer.files_indexed())
            .await;

        Ok(CrawlOutcome {
            status: CrawlStatus::Processing,
            files_processed: result.files_processed,
            files_indexed: 0,
            files_failed: result.files_failed,
            new_revision: None,
            last_processed_project: None,
            last_crawled_at: None,
            duration_seconds: None,
            error: None,
        })
    }

    async fn run_git(
        &self,
        repository: &Repository,
        policy: &ExclusionPolicy,
        repo_index: &RepoIndex,
        indexer: &mut BatchIndexer,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        self.progress.update_status(repository.id, CrawlStatus::Cloning).await;
        let repo_path = self.config.working_directory.join(repository.index_name());
        self.git_operations
            .clone_or_update_repository(repository, &repo_path)
            .await
            .map_err(|e| CrawlError::TransientTransport(e.to_string()))?;

        self.progress.update_status(repository.id, CrawlStatus::Processing).await;
        repo_index.delete_all_documents().await?;

        let branch_indexer = GitBranchIndexer::new(policy);
        let stats = branch_indexer.index_repository(repository, &repo_path, indexer, cancel).await?;

        self.progress
            .update_progress(repository.id, stats.files_processed, Some(stats.files_processed), indexer.files_indexed())
            .await;

        Ok(CrawlOutcome {
            status: CrawlStatus::Processing,
            files_processed: stats.files_processed,
            files_indexed: 0,
            files_failed: 0,
            new_revision: None,
            last_processed_project: None,
            last_crawled_at: None,
            duration_seconds: None,
            error: None,
        })
    }

    async fn run_svn(
        &self,
        repository: &Repository,
        policy: &ExclusionPolicy,
        indexer: &mut BatchIndexer,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        self.progress.update_status(repository.id, CrawlStatus::Processing).await;

        let password = self.decrypt_token(repository);
        let client = SvnClient::new(repository.url.clone(), repository.username.clone(), password);
        let driver = SvnIncrementalDriver::new(client, policy);
        let from_rev = repository.revision.unwrap_or(0);
        let (new_revision, stats) = driver.sync(repository, from_rev, indexer, cancel).await?;

        self.progress
            .update_progress(repository.id, stats.files_updated + stats.files_deleted, None, indexer.files_indexed())
            .await;

        Ok(CrawlOutcome {
            status: CrawlStatus::Processing,
            files_processed: stats.files_updated + stats.files_deleted,
            files_indexed: 0,
            files_failed: 0,
            new_revision: Some(new_revision),
            last_processed_project: None,
            last_crawled_at: None,
            duration_seconds: None,
            error: None,
        })
    }

    async fn run_gitlab(
        &self,
        repository: &Repository,
        policy: &ExclusionPolicy,
        repo_index: &RepoIndex,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        let token = self.decrypt_token(repository);
        let enumerator = GitLabProjectEnumerator::new(repository.url.clone(), token.clone());
        let mut projects = enumerator
            .enumerate(&repository.name, &repository.excluded_projects, &repository.excluded_name_patterns, token.as_deref(), cancel)
            .await?;
        self.reencrypt_project_tokens(&mut projects);

        self.run_project_sequence(repository, policy, repo_index, cancel, projects).await
    }

    async fn run_github(
        &self,
        repository: &Repository,
        policy: &ExclusionPolicy,
        repo_index: &RepoIndex,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        let token = self.decrypt_token(repository);
        let enumerator = GitHubRepoEnumerator::new("https://api.github.com", token.clone());
        let mut projects = enumerator
            .enumerate(&repository.name, &repository.excluded_projects, &repository.excluded_name_patterns, token.as_deref(), cancel)
            .await?;
        self.reencrypt_project_tokens(&mut projects);

        self.run_project_sequence(repository, policy, repo_index, cancel, projects).await
    }

    /// Enumerators stamp each materialized project with the plaintext token
    /// they were given (decrypted once for the listing API call); re-encrypt
    /// it here so `Repository.access_token`'s at-rest contract holds and
    /// `GitOperations::clone_fresh_repository`'s own decrypt step succeeds
    /// instead of silently falling back to an unauthenticated clone.
    fn reencrypt_project_tokens(&self, projects: &mut [Repository]) {
        for project in projects {
            if let Some(plaintext) = &project.access_token {
                match self.encryption_service.encrypt(plaintext) {
                    Ok(encrypted) => project.access_token = Some(encrypted),
                    Err(e) => {
                        warn!(project = %project.name, error = %e, "failed to re-encrypt project access token, clearing it");
                        project.access_token = None;
                    }
                }
            }
        }
    }

    /// Drives every enumerated project through [`GitBranchIndexer`] in
    /// turn, reporting hierarchical progress; a single project's failure is
    /// logged and counted, not propagated.
    async fn run_project_sequence(
        &self,
        repository: &Repository,
        policy: &ExclusionPolicy,
        repo_index: &RepoIndex,
        cancel: &CancellationToken,
        projects: Vec<Repository>,
    ) -> Result<CrawlOutcome, CrawlError> {
        self.progress.set_gitlab_projects_total(repository.id, projects.len()).await;
        repo_index.delete_all_documents().await?;

        let mut files_processed = 0;
        let mut files_indexed = 0;
        let mut files_failed = 0;
        let mut succeeded = 0;
        let mut last_processed_project = repository.last_processed_project.clone();
        let branch_indexer = GitBranchIndexer::new(policy);

        for project in &projects {
            if cancel.is_cancelled() {
                break;
            }
            self.progress.set_current_gitlab_project(repository.id, Some(project.name.clone())).await;

            let repo_path = self.config.working_directory.join(project.index_name());
            let mut project_indexer = BatchIndexer::new(repo_index.clone(), self.config.batch_size);

            let clone_result = self.git_operations.clone_or_update_repository(project, &repo_path).await;
            if let Err(e) = clone_result {
                warn!(project = %project.name, error = %e, "failed to clone project, skipping");
                last_processed_project = Some(project.name.clone());
                self.progress.complete_current_gitlab_project(repository.id).await;
                continue;
            }

            match branch_indexer.index_repository(project, &repo_path, &mut project_indexer, cancel).await {
                Ok(stats) => {
                    project_indexer.flush().await;
                    files_processed += stats.files_processed;
                    files_indexed += project_indexer.files_indexed();
                    files_failed += project_indexer.files_failed();
                    succeeded += 1;
                }
                Err(e) => {
                    project_indexer.flush().await;
                    files_indexed += project_indexer.files_indexed();
                    files_failed += project_indexer.files_failed();
                    warn!(project = %project.name, error = %e, "project crawl failed, skipping");
                }
            }
            last_processed_project = Some(project.name.clone());
            self.progress.complete_current_gitlab_project(repository.id).await;
        }

        if succeeded == 0 && !projects.is_empty() {
            return Err(CrawlError::RemoteProtocol("every project in this organization failed to crawl".to_string()));
        }

        Ok(CrawlOutcome {
            status: CrawlStatus::Processing,
            files_processed,
            files_indexed,
            files_failed,
            new_revision: None,
            last_processed_project,
            last_crawled_at: None,
            duration_seconds: None,
            error: None,
        })
    }

    fn decrypt_token(&self, repository: &Repository) -> Option<String> {
        match &repository.access_token {
            Some(encrypted) => match self.encryption_service.decrypt(encrypted) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(repository = %repository.name, error = %e, "failed to decrypt access token");
                    None
                }
            },
            None => None,
        }
    }
}
