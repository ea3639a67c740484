//! GITLAB-1: org-scope enumeration, pagination, glob exclusion, and
//! per-project clone-failure tolerance, driven through the public
//! `CrawlerSupervisor`.

use codecrawl::config::CrawlerConfig;
use codecrawl::encryption::EncryptionService;
use codecrawl::progress::{CrawlStatus, ProgressTracker};
use codecrawl::{CrawlerSupervisor, Repository, RepositoryKind};
use httpmock::MockServer;
use serde_json::json;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().expect("git must be on PATH for this test");
    assert!(status.success(), "git {:?} failed in {:?}", args, dir);
}

fn fixture_repo(file_name: &str, content: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q", "-b", "main"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "user.name", "Test"]);
    std::fs::write(dir.path().join(file_name), content).unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial"]);
    dir
}

fn supervisor(index_root: &Path, working_directory: &Path) -> CrawlerSupervisor {
    let encryption = Arc::new(EncryptionService::new("test-key-used-only-in-tests-32b").unwrap());
    let progress = Arc::new(ProgressTracker::new());
    let mut config = CrawlerConfig::default();
    config.working_directory = working_directory.to_path_buf();
    CrawlerSupervisor::new(config, index_root, encryption, progress)
}

#[tokio::test]
async fn gitlab_1_paginates_and_excludes_by_glob() {
    let server = MockServer::start();
    let lib_repo = fixture_repo("lib.rs", "fn lib() {}");
    let app_repo = fixture_repo("app.rs", "fn app() {}");

    let page1 = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/api/v4/groups/team/projects").query_param("page", "1");
        then.status(200).header("x-next-page", "2").json_body(json!([
            {"path_with_namespace": "team/lib", "http_url_to_repo": lib_repo.path().to_string_lossy()},
            {"path_with_namespace": "team/legacy-archive", "http_url_to_repo": "/nonexistent/legacy-archive"},
        ]));
    });
    let page2 = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/api/v4/groups/team/projects").query_param("page", "2");
        then.status(200).json_body(json!([
            {"path_with_namespace": "team/app", "http_url_to_repo": app_repo.path().to_string_lossy()},
        ]));
    });

    let index_root = tempfile::tempdir().unwrap();
    let working_directory = tempfile::tempdir().unwrap();
    let supervisor = supervisor(index_root.path(), working_directory.path());

    let mut repository = Repository::new("team", RepositoryKind::GitLab, server.base_url());
    // The wildcard is scoped to the segment after the literal `team/` so the
    // match doesn't depend on whether `*` is allowed to cross `/`.
    repository.excluded_name_patterns = vec!["team/*-archive".to_string()];

    let outcome = supervisor.crawl(&repository).await;

    page1.assert();
    page2.assert();
    assert!(matches!(outcome.status, CrawlStatus::Completed), "{:?}", outcome.error);
    assert_eq!(outcome.files_indexed, 2, "both non-excluded projects (lib, app) are indexed");
}

#[tokio::test]
async fn gitlab_project_clone_failure_does_not_abort_the_others() {
    let server = MockServer::start();
    let lib_repo = fixture_repo("lib.rs", "fn lib() {}");

    let page = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/api/v4/groups/team/projects").query_param("page", "1");
        then.status(200).json_body(json!([
            {"path_with_namespace": "team/broken", "http_url_to_repo": "/definitely/does/not/exist"},
            {"path_with_namespace": "team/lib", "http_url_to_repo": lib_repo.path().to_string_lossy()},
        ]));
    });

    let index_root = tempfile::tempdir().unwrap();
    let working_directory = tempfile::tempdir().unwrap();
    let supervisor = supervisor(index_root.path(), working_directory.path());
    let repository = Repository::new("team", RepositoryKind::GitLab, server.base_url());

    let outcome = supervisor.crawl(&repository).await;

    page.assert();
    assert!(matches!(outcome.status, CrawlStatus::Completed), "one project's clone failure must not fail the whole org crawl: {:?}", outcome.error);
    assert_eq!(outcome.files_indexed, 1, "only the clonable project contributes documents");
}
