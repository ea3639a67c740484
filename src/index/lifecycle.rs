use crate::error::CrawlError;
use crate::index::schema::{self, IndexFields};
use crate::models::Repository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Schema};
use tantivy::{Index, IndexReader, IndexWriter, Term};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// An open per-repository index, ready for [`crate::index::batch::BatchIndexer`]
/// to write to and for a reader to query against.
#[derive(Clone)]
pub struct RepoIndex {
    pub index: Index,
    pub reader: IndexReader,
    pub writer: Arc<RwLock<IndexWriter>>,
    pub fields: IndexFields,
    pub path: PathBuf,
}

impl RepoIndex {
    pub async fn commit(&self) -> Result<(), CrawlError> {
        let mut writer = self.writer.write().await;
        writer
            .commit()
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        self.reader
            .reload()
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        Ok(())
    }

    /// Deletes every document carrying `id` (upsert semantics -- callers
    /// delete-then-add rather than relying on Tantivy's nonexistent
    /// in-place update).
    pub async fn delete_by_id(&self, id: &str) -> Result<(), CrawlError> {
        let writer = self.writer.write().await;
        let term = Term::from_field_text(self.fields.id, id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        writer
            .delete_query(Box::new(query))
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        Ok(())
    }

    /// Wipes every document in this index without deleting the index
    /// directory itself. Used ahead of a full (non-incremental) crawl.
    pub async fn delete_all_documents(&self) -> Result<(), CrawlError> {
        let mut writer = self.writer.write().await;
        writer
            .delete_query(Box::new(AllQuery))
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        writer
            .commit()
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        self.reader
            .reload()
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        Ok(())
    }
}

/// Owns the mapping from a [`Repository`] to its physical Tantivy index on
/// disk, and the schema shared by every one of them.
#[derive(Clone)]
pub struct IndexLifecycle {
    index_root: PathBuf,
    schema: Schema,
}

impl IndexLifecycle {
    pub fn new(index_root: impl Into<PathBuf>) -> Self {
        Self {
            index_root: index_root.into(),
            schema: schema::build_schema(),
        }
    }

    fn index_path(&self, repository: &Repository) -> PathBuf {
        self.index_root.join(repository.index_name())
    }

    /// Opens the existing index for `repository`, or creates one with the
    /// shared schema if none exists yet. An existing index whose schema
    /// doesn't match the shared one is a configuration error, not a silent
    /// migration.
    pub async fn open_or_create(&self, repository: &Repository) -> Result<RepoIndex, CrawlError> {
        let path = self.index_path(repository);
        let schema = self.schema.clone();

        tokio::task::spawn_blocking(move || Self::open_or_create_blocking(&path, schema))
            .await
            .map_err(|e| CrawlError::IndexBackendFailure(format!("index task panicked: {e}")))?
    }

    fn open_or_create_blocking(path: &Path, schema: Schema) -> Result<RepoIndex, CrawlError> {
        std::fs::create_dir_all(path).map_err(CrawlError::LocalIo)?;

        let directory =
            MmapDirectory::open(path).map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        let existed = Index::exists(&directory).unwrap_or(false);
        let index = Index::open_or_create(directory, schema.clone())
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;

        if existed && index.schema() != schema {
            return Err(CrawlError::Configuration(format!(
                "index at {} has a schema that no longer matches the shared schema",
                path.display()
            )));
        }

        schema::register_path_tokenizer(&index);

        let reader = index
            .reader()
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        let writer = index
            .writer(50_000_000)
            .map_err(|e| CrawlError::IndexBackendFailure(e.to_string()))?;
        let fields = schema::extract_fields(&index.schema());

        info!(path = %path.display(), existed, "opened per-repository index");

        Ok(RepoIndex {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
            path: path.to_path_buf(),
        })
    }

    /// Removes `repository`'s index directory entirely. Does not gate on
    /// in-flight crawls; callers must `stop()` and await cancellation
    /// first.
    pub async fn remove(&self, repository: &Repository) -> Result<(), CrawlError> {
        let path = self.index_path(repository);
        if path.exists() {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(CrawlError::LocalIo)?;
            debug!(path = %path.display(), "removed repository index directory");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepositoryKind;

    #[tokio::test]
    async fn opens_then_reopens_same_index() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = IndexLifecycle::new(dir.path());
        let repo = Repository::new("demo", RepositoryKind::FileSystem, "/tmp/demo");

        let first = lifecycle.open_or_create(&repo).await.unwrap();
        first.commit().await.unwrap();

        let second = lifecycle.open_or_create(&repo).await.unwrap();
        assert_eq!(first.path, second.path);
    }

    #[tokio::test]
    async fn remove_deletes_index_directory() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = IndexLifecycle::new(dir.path());
        let repo = Repository::new("demo", RepositoryKind::FileSystem, "/tmp/demo");

        let repo_index = lifecycle.open_or_create(&repo).await.unwrap();
        let path = repo_index.path.clone();
        drop(repo_index);

        lifecycle.remove(&repo).await.unwrap();
        assert!(!path.exists());
    }
}
