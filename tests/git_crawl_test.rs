//! End-to-end Git crawl scenario (GIT-1), driven through the public
//! `CrawlerSupervisor` against a local repository built with the `git`
//! CLI as a fixture (the crawler itself never shells out to `git`; it
//! reads objects directly through `gix`).

use codecrawl::config::CrawlerConfig;
use codecrawl::encryption::EncryptionService;
use codecrawl::identity::file_id;
use codecrawl::index::IndexLifecycle;
use codecrawl::progress::{CrawlStatus, ProgressTracker};
use codecrawl::{CrawlerSupervisor, Repository, RepositoryKind};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::AllQuery;
use tantivy::TantivyDocument;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().expect("git must be on PATH for this test");
    assert!(status.success(), "git {:?} failed in {:?}", args, dir);
}

/// A repository with two branches, `main` and `dev`, each with a
/// differing `src/a.txt`.
fn fixture_repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q", "-b", "main"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "user.name", "Test"]);

    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/a.txt"), "hi").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial"]);

    git(dir.path(), &["checkout", "-q", "-b", "dev"]);
    std::fs::write(dir.path().join("src/a.txt"), "hello").unwrap();
    git(dir.path(), &["commit", "-aqm", "dev change"]);
    git(dir.path(), &["checkout", "-q", "main"]);

    dir
}

#[tokio::test]
async fn git_1_two_branches_produce_two_distinct_records() {
    let fixture = fixture_repo();
    let fixture_url = fixture.path().to_string_lossy().to_string();

    let index_root = tempfile::tempdir().unwrap();
    let encryption = Arc::new(EncryptionService::new("test-key-used-only-in-tests-32b").unwrap());
    let progress = Arc::new(ProgressTracker::new());
    let mut config = CrawlerConfig::default();
    config.working_directory = tempfile::tempdir().unwrap().into_path();
    let supervisor = CrawlerSupervisor::new(config, index_root.path(), encryption, progress);

    let repository = Repository::new("r", RepositoryKind::Git, &fixture_url);
    let outcome = supervisor.crawl(&repository).await;

    assert!(matches!(outcome.status, CrawlStatus::Completed), "{:?}", outcome.error);
    assert_eq!(outcome.files_indexed, 2);

    let lifecycle = IndexLifecycle::new(index_root.path());
    let repo_index = lifecycle.open_or_create(&repository).await.unwrap();
    let searcher = repo_index.reader.searcher();
    let hits = searcher.search(&AllQuery, &TopDocs::with_limit(10)).unwrap();
    assert_eq!(hits.len(), 2);

    let fields = &repo_index.fields;
    let mut contents_by_id = std::collections::HashMap::new();
    for (_, addr) in hits {
        let doc: TantivyDocument = searcher.doc(addr).unwrap();
        let id = doc.get_first(fields.id).and_then(|v| v.as_str()).unwrap().to_string();
        let content = doc.get_first(fields.content).and_then(|v| v.as_str()).unwrap().to_string();
        contents_by_id.insert(id, content);
    }

    let main_id = file_id(&format!("{fixture_url}@main:/src/a.txt"));
    let dev_id = file_id(&format!("{fixture_url}@dev:/src/a.txt"));
    assert_eq!(contents_by_id.get(&main_id).map(String::as_str), Some("hi"));
    assert_eq!(contents_by_id.get(&dev_id).map(String::as_str), Some("hello"));
}
