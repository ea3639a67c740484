use serde::{Deserialize, Serialize};

/// One crawled source file, ready to hand to
/// [`crate::index::batch::BatchIndexer`].
///
/// `id` is the lowercase hex SHA-256 of the canonical path (see
/// [`crate::identity`]), not a random identifier -- re-crawling the same
/// path always produces the same id, which is what lets a later crawl
/// overwrite rather than duplicate a document.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub path: String,
    pub content: Option<String>,
    pub project: String,
    pub version: String,
    pub extension: String,
    pub size: i64,
    /// Filesystem mtime for FS crawls; absent for Git/SVN/GitLab/GitHub,
    /// which have no single-file mtime without a history walk.
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    /// SVN only: the author of the revision that last touched this path.
    pub last_author: Option<String>,
    /// SVN only: the commit date of the revision that last touched this path.
    pub last_date: Option<chrono::DateTime<chrono::Utc>>,
}
