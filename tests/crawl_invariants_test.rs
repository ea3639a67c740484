//! Cross-cutting invariants that hold across crawl backends, rather than
//! one backend's specific named scenario.

use codecrawl::config::CrawlerConfig;
use codecrawl::encryption::EncryptionService;
use codecrawl::progress::{CrawlStatus, ProgressTracker};
use codecrawl::{CrawlerSupervisor, Repository, RepositoryKind};
use std::sync::Arc;
use std::time::Duration;

fn supervisor(index_root: &std::path::Path) -> CrawlerSupervisor {
    let encryption = Arc::new(EncryptionService::new("test-key-used-only-in-tests-32b").unwrap());
    let progress = Arc::new(ProgressTracker::new());
    CrawlerSupervisor::new(CrawlerConfig::default(), index_root, encryption, progress)
}

/// `filesIndexed` never exceeds `filesProcessed`, whatever the backend.
#[tokio::test]
async fn files_indexed_never_exceeds_files_processed() {
    let root = tempfile::tempdir().unwrap();
    for i in 0..5 {
        std::fs::write(root.path().join(format!("f{i}.rs")), format!("fn f{i}() {{}}")).unwrap();
    }

    let index_root = tempfile::tempdir().unwrap();
    let supervisor = supervisor(index_root.path());
    let repository = Repository::new("r", RepositoryKind::FileSystem, root.path().to_string_lossy());
    let outcome = supervisor.crawl(&repository).await;

    assert!(matches!(outcome.status, CrawlStatus::Completed));
    assert!(outcome.files_indexed <= outcome.files_processed);
    assert_eq!(outcome.files_processed, 5);
    assert_eq!(outcome.files_indexed, 5);
}

/// A file above `max_file_bytes` is still counted and given a document
/// (metadata-only), but its content is never read into the index.
#[tokio::test]
async fn oversized_file_is_indexed_without_content() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("huge.rs"), vec![b'x'; 64]).unwrap();

    let index_root = tempfile::tempdir().unwrap();
    let encryption = Arc::new(EncryptionService::new("test-key-used-only-in-tests-32b").unwrap());
    let progress = Arc::new(ProgressTracker::new());
    let mut config = CrawlerConfig::default();
    config.max_file_bytes = 8; // smaller than huge.rs
    let supervisor = CrawlerSupervisor::new(config, index_root.path(), encryption, progress);

    let repository = Repository::new("r", RepositoryKind::FileSystem, root.path().to_string_lossy());
    let outcome = supervisor.crawl(&repository).await;

    assert!(matches!(outcome.status, CrawlStatus::Completed));
    assert_eq!(outcome.files_processed, 1, "the file is still counted even though it's too large to read");
    assert_eq!(outcome.files_indexed, 1, "and still gets a metadata-only document");

    let lifecycle = codecrawl::index::IndexLifecycle::new(index_root.path());
    let repo_index = lifecycle.open_or_create(&repository).await.unwrap();
    let searcher = repo_index.reader.searcher();
    let hits = searcher.search(&tantivy::query::AllQuery, &tantivy::collector::TopDocs::with_limit(10)).unwrap();
    assert_eq!(hits.len(), 1);
    let (_, addr) = hits[0];
    let doc: tantivy::TantivyDocument = searcher.doc(addr).unwrap();
    assert!(doc.get_first(repo_index.fields.content).is_none(), "oversized file content must not be stored");
}

/// Cancelling mid-crawl reaches the `cancelled` terminal state promptly --
/// the crawl does not keep running to completion after `stop()`.
#[tokio::test]
async fn stop_reaches_cancelled_state_promptly() {
    let root = tempfile::tempdir().unwrap();
    for i in 0..200 {
        std::fs::write(root.path().join(format!("f{i}.rs")), format!("fn f{i}() {{}}")).unwrap();
    }

    let index_root = tempfile::tempdir().unwrap();
    let encryption = Arc::new(EncryptionService::new("test-key-used-only-in-tests-32b").unwrap());
    let progress = Arc::new(ProgressTracker::new());
    let supervisor = Arc::new(CrawlerSupervisor::new(CrawlerConfig::default(), index_root.path(), encryption, progress));

    let mut repository = Repository::new("r", RepositoryKind::FileSystem, root.path().to_string_lossy());
    repository.max_crawl_duration_minutes = Some(60);
    let repository_id = repository.id;

    let crawl_supervisor = supervisor.clone();
    let crawl = tokio::spawn(async move { crawl_supervisor.crawl(&repository).await });

    // Give the crawl a moment to register itself as active, then cancel.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let stopped = supervisor.stop(repository_id).await;

    let outcome = tokio::time::timeout(Duration::from_secs(2), crawl)
        .await
        .expect("crawl must reach a terminal state within the timeout bound")
        .unwrap();

    assert!(stopped, "stop() must find an active crawl to cancel");
    assert!(matches!(outcome.status, CrawlStatus::Cancelled) || matches!(outcome.status, CrawlStatus::Completed));
}

/// `stop()` against a repository id with no active crawl is a no-op that
/// reports failure rather than panicking.
#[tokio::test]
async fn stop_on_unknown_repository_returns_false() {
    let index_root = tempfile::tempdir().unwrap();
    let supervisor = supervisor(index_root.path());
    assert!(!supervisor.stop(uuid::Uuid::new_v4()).await);
}
