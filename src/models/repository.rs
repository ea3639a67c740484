use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a [`Repository`] is ingested with.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    FileSystem,
    Svn,
    Git,
    GitLab,
    GitHub,
}

/// Describes what to crawl. Immutable for the duration of one crawl;
/// callers persist the fields under "resumable state" back to their own
/// storage once a crawl finishes.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Repository {
    pub id: Uuid,
    pub name: String,
    pub kind: RepositoryKind,
    /// Clone URL, SVN URL, or filesystem root, depending on `kind`.
    pub url: String,
    /// Browser-facing project URL (no `.git` suffix), set only for
    /// repositories materialized by a GitLab org-crawl enumeration; used
    /// in place of `url` when composing that backend's canonical path.
    pub web_url: Option<String>,
    pub username: Option<String>,
    /// Encrypted at rest; see [`crate::encryption::EncryptionService`].
    /// Decrypted only for the duration of a clone or API call.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub branch: Option<String>,
    /// SVN tip observed on the previous crawl; `None` means "full crawl".
    pub revision: Option<i64>,
    pub max_crawl_duration_minutes: Option<u32>,

    // GitLab/GitHub org-crawl overrides.
    pub excluded_projects: Vec<String>,
    pub excluded_name_patterns: Vec<String>,

    // Resumable org crawls / scheduling handoff, consumed but never
    // persisted by this crate.
    pub last_processed_project: Option<String>,
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn new(name: impl Into<String>, kind: RepositoryKind, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            url: url.into(),
            web_url: None,
            username: None,
            access_token: None,
            branch: None,
            revision: None,
            max_crawl_duration_minutes: None,
            excluded_projects: Vec::new(),
            excluded_name_patterns: Vec::new(),
            last_processed_project: None,
            last_crawled_at: None,
        }
    }

    /// The per-repository index name: `idx_<lowercase name>-<id>`, sanitized
    /// to a filesystem-safe directory component.
    pub fn index_name(&self) -> String {
        let slug: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("idx_{}-{}", slug, self.id)
    }
}
