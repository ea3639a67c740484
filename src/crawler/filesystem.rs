//! Two-pass plain-filesystem crawl: count, then ingest.

use crate::exclusion::ExclusionPolicy;
use crate::identity::{extract_extension, file_id};
use crate::index::batch::BatchIndexer;
use crate::models::FileRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct FilesystemWalker<'a> {
    root: PathBuf,
    policy: &'a ExclusionPolicy,
    cancel: CancellationToken,
}

pub struct FilesystemCrawlResult {
    pub files_total: usize,
    pub files_processed: usize,
    pub files_failed: usize,
}

impl<'a> FilesystemWalker<'a> {
    pub fn new(root: impl Into<PathBuf>, policy: &'a ExclusionPolicy, cancel: CancellationToken) -> Self {
        Self { root: root.into(), policy, cancel }
    }

    /// Lazily walks `root` counting eligible regular files, pruning
    /// excluded subtrees as it goes.
    pub fn count(&self) -> usize {
        let mut total = 0;
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && self.policy.is_directory_excluded(e.path())))
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file()
                && !self.policy.any_ancestor_excluded(&self.root, entry.path())
                && !self.policy.is_file_excluded(entry.path())
            {
                total += 1;
            }
        }
        total
    }

    /// Depth-first ingest pass with cancellation checks and a symlink-cycle
    /// guard (canonicalized directory identities on the current descent
    /// path), feeding eligible files to `indexer`.
    pub async fn ingest(
        &self,
        indexer: &mut BatchIndexer,
        max_symlink_depth: u32,
    ) -> FilesystemCrawlResult {
        let mut files_processed = 0;
        let mut files_failed = 0;
        let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .max_depth(max_symlink_depth as usize)
            .into_iter()
            .filter_entry(|e| {
                if e.file_type().is_dir() {
                    if self.policy.is_directory_excluded(e.path()) {
                        return false;
                    }
                    if let Ok(canonical) = e.path().canonicalize() {
                        if !visited_dirs.insert(canonical) {
                            return false;
                        }
                    }
                }
                true
            });

        for entry in walker {
            if self.cancel.is_cancelled() {
                break;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to visit filesystem entry, skipping");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.policy.is_file_excluded(path) {
                continue;
            }

            match self.build_record(path).await {
                Ok(record) => {
                    indexer.add(record).await;
                    files_processed += 1;
                }
                Err(FileVisitError::Skip) => continue,
                Err(FileVisitError::Io) => {
                    files_failed += 1;
                    continue;
                }
            }
        }

        indexer.flush().await;
        FilesystemCrawlResult { files_total: files_processed, files_processed, files_failed }
    }

    async fn build_record(&self, path: &Path) -> Result<FileRecord, FileVisitError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not stat file, skipping");
                return Err(FileVisitError::Io);
            }
        };

        let name = path.file_name().and_then(|n| n.to_str()).ok_or(FileVisitError::Skip)?.to_string();
        let extension = extract_extension(&name);
        let size = metadata.len();
        let canonical_path = path.to_string_lossy().replace('\\', "/");

        let (project, version) = project_version_from_path(&canonical_path);

        let content = if self.policy.should_read_content(path, size) {
            match tokio::fs::read(path).await {
                Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not read file content, skipping");
                    return Err(FileVisitError::Io);
                }
            }
        } else {
            None
        };

        let last_modified = metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);

        debug!(path = %canonical_path, "built filesystem file record");

        Ok(FileRecord {
            id: file_id(&canonical_path),
            name,
            path: canonical_path,
            content,
            project: project.unwrap_or_default(),
            version,
            extension,
            size: size as i64,
            last_modified,
            last_author: None,
            last_date: None,
        })
    }
}

enum FileVisitError {
    /// Not a real file visit (e.g. non-UTF8 name) -- not counted as failed.
    Skip,
    /// I/O error on a file that was otherwise eligible -- counted in `numberOfFailedDocuments`.
    Io,
}

/// Parses `/trunk/` or `/branches/<name>/` segments out of a path, the way
/// repositories mirrored from SVN onto plain disk are commonly laid out.
/// Defaults to `project=None`, `version="trunk"` when no such segment is
/// present.
fn project_version_from_path(path: &str) -> (Option<String>, String) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    for (i, segment) in segments.iter().enumerate() {
        if *segment == "trunk" {
            let project = if i > 0 { Some(segments[i - 1].to_string()) } else { None };
            return (project, "trunk".to_string());
        }
        if *segment == "branches" && i + 1 < segments.len() {
            let project = if i > 0 { Some(segments[i - 1].to_string()) } else { None };
            return (project, segments[i + 1].to_string());
        }
    }

    (None, "trunk".to_string())
}
