//! End-to-end filesystem crawl scenarios, driven through the public
//! `CrawlerSupervisor` rather than the lower-level `FilesystemWalker`
//! unit tests.

use codecrawl::config::CrawlerConfig;
use codecrawl::encryption::EncryptionService;
use codecrawl::identity::file_id;
use codecrawl::index::IndexLifecycle;
use codecrawl::progress::{CrawlStatus, ProgressTracker};
use codecrawl::{CrawlerSupervisor, Repository, RepositoryKind};
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::AllQuery;
use tantivy::TantivyDocument;

fn supervisor(index_root: &std::path::Path) -> CrawlerSupervisor {
    let encryption = Arc::new(EncryptionService::new("test-key-used-only-in-tests-32b").unwrap());
    let progress = Arc::new(ProgressTracker::new());
    CrawlerSupervisor::new(CrawlerConfig::default(), index_root, encryption, progress)
}

#[tokio::test]
async fn fs_1_single_readable_file_is_indexed_tags_excluded() {
    let root = tempfile::tempdir().unwrap();
    let project_root = root.path().join("r").join("a");
    std::fs::create_dir_all(project_root.join("trunk")).unwrap();
    std::fs::create_dir_all(project_root.join("tags/old")).unwrap();
    std::fs::write(project_root.join("trunk/x.rs"), b"fn main() {}").unwrap();
    std::fs::write(project_root.join("trunk/binary.bin"), vec![0u8; 1024]).unwrap();
    std::fs::write(project_root.join("tags/old/x.rs"), b"fn main() {}").unwrap();

    let index_root = tempfile::tempdir().unwrap();
    let supervisor = supervisor(index_root.path());
    let repository = Repository::new("a", RepositoryKind::FileSystem, project_root.to_string_lossy());

    let outcome = supervisor.crawl(&repository).await;
    assert!(matches!(outcome.status, CrawlStatus::Completed));
    assert_eq!(outcome.files_indexed, 1);

    let lifecycle = IndexLifecycle::new(index_root.path());
    let repo_index = lifecycle.open_or_create(&repository).await.unwrap();
    let searcher = repo_index.reader.searcher();
    let hits = searcher.search(&AllQuery, &TopDocs::with_limit(10)).unwrap();
    assert_eq!(hits.len(), 1);

    let (_, addr) = hits[0];
    let doc: TantivyDocument = searcher.doc(addr).unwrap();
    let fields = &repo_index.fields;
    let path = doc.get_first(fields.path).and_then(|v| v.as_str()).unwrap().to_string();
    assert!(path.ends_with("trunk/x.rs"));
    assert_eq!(doc.get_first(fields.project).and_then(|v| v.as_str()), Some("a"));
    assert_eq!(doc.get_first(fields.version).and_then(|v| v.as_str()), Some("trunk"));
    assert_eq!(doc.get_first(fields.content).and_then(|v| v.as_str()), Some("fn main() {}"));
    assert_eq!(doc.get_first(fields.id).and_then(|v| v.as_str()), Some(file_id(&path).as_str()));
}

#[tokio::test]
async fn fs_1_recrawl_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let project_root = root.path().join("r").join("a");
    std::fs::create_dir_all(project_root.join("trunk")).unwrap();
    std::fs::write(project_root.join("trunk/x.rs"), b"fn main() {}").unwrap();

    let index_root = tempfile::tempdir().unwrap();
    let supervisor = supervisor(index_root.path());
    let repository = Repository::new("a", RepositoryKind::FileSystem, project_root.to_string_lossy());

    supervisor.crawl(&repository).await;
    let second = supervisor.crawl(&repository).await;
    assert_eq!(second.files_indexed, 1);

    let lifecycle = IndexLifecycle::new(index_root.path());
    let repo_index = lifecycle.open_or_create(&repository).await.unwrap();
    let searcher = repo_index.reader.searcher();
    let hits = searcher.search(&AllQuery, &TopDocs::with_limit(10)).unwrap();
    assert_eq!(hits.len(), 1, "re-crawling the same unchanged tree must not leave duplicate documents");
}

#[cfg(unix)]
#[tokio::test]
async fn fs_2_symlink_cycle_does_not_hang() {
    let root = tempfile::tempdir().unwrap();
    let project_root = root.path().join("r").join("a").join("trunk");
    std::fs::create_dir_all(&project_root).unwrap();
    std::fs::write(project_root.join("x.rs"), b"fn main() {}").unwrap();
    std::os::unix::fs::symlink(&project_root, project_root.join("self")).unwrap();

    let index_root = tempfile::tempdir().unwrap();
    let supervisor = supervisor(index_root.path());
    let repository = Repository::new("a", RepositoryKind::FileSystem, project_root.to_string_lossy());

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(30), supervisor.crawl(&repository))
        .await
        .expect("crawl must terminate despite the symlink cycle, not loop forever");

    assert!(matches!(outcome.status, CrawlStatus::Completed));
    assert_eq!(outcome.files_indexed, 1, "the real file is reachable exactly once despite the cycle");
}
