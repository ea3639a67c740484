use crate::error::CrawlError;
use crate::index::lifecycle::RepoIndex;
use crate::models::FileRecord;
use std::time::Duration;
use tantivy::doc;
use tracing::{error, info, warn};

/// Guards against unbounded batch growth when a backend's `flush` falls
/// behind `add` (e.g. a slow or backed-off index writer): once the
/// buffered content crosses this many bytes, the whole buffer is dropped
/// rather than grown further, modeling the "allocation failure" error kind
/// as a size guard instead of a caught fault.
const MAX_BUFFER_BYTES: usize = 256 * 1024 * 1024;

/// Accumulates [`FileRecord`]s and bulk-writes them to a [`RepoIndex`] once
/// the buffer crosses the configured batch size, or on an explicit final
/// `flush`.
///
/// Never lets a backend failure abort the crawl that's feeding it: every
/// failure mode folds into `files_failed` and a log line instead of
/// propagating.
pub struct BatchIndexer {
    repo_index: RepoIndex,
    batch_size: usize,
    buffer: Vec<FileRecord>,
    buffered_bytes: usize,
    files_indexed: usize,
    files_failed: usize,
}

impl BatchIndexer {
    pub fn new(repo_index: RepoIndex, batch_size: usize) -> Self {
        Self {
            repo_index,
            batch_size,
            buffer: Vec::new(),
            buffered_bytes: 0,
            files_indexed: 0,
            files_failed: 0,
        }
    }

    pub fn files_indexed(&self) -> usize {
        self.files_indexed
    }

    pub fn files_failed(&self) -> usize {
        self.files_failed
    }

    /// Deletes `id` from the underlying index immediately, independent of
    /// the add buffer -- used for SVN delete-entry replay, where a file can
    /// be removed without ever passing through `add`.
    pub async fn delete_by_id(&mut self, id: &str) {
        if let Err(e) = self.repo_index.delete_by_id(id).await {
            warn!(id, error = %e, "failed to delete document by id");
            return;
        }
        if let Err(e) = self.repo_index.commit().await {
            warn!(id, error = %e, "failed to commit after delete");
        }
    }

    /// Inserts `record` into the buffer, flushing if the batch size is
    /// exceeded, or dropping the whole buffer if it has grown past
    /// [`MAX_BUFFER_BYTES`].
    pub async fn add(&mut self, record: FileRecord) {
        self.buffered_bytes += record.content.as_ref().map(|c| c.len()).unwrap_or(0);
        self.buffer.push(record);

        if self.buffered_bytes > MAX_BUFFER_BYTES {
            self.drop_oversized_buffer();
            return;
        }
        if self.buffer.len() > self.batch_size {
            self.flush().await;
        }
    }

    fn drop_oversized_buffer(&mut self) {
        let err = CrawlError::OutOfMemory(format!("batch buffer exceeded {MAX_BUFFER_BYTES} bytes"));
        error!(
            error = %err,
            paths = ?self.buffer.iter().map(|r| r.path.clone()).collect::<Vec<_>>(),
            "dropping oversized batch buffer"
        );
        self.files_failed += self.buffer.len();
        self.buffer.clear();
        self.buffered_bytes = 0;
    }

    /// Collapses same-`id` duplicates within the buffer to their last
    /// write, so a file touched twice before a flush boundary (e.g. added
    /// then immediately renamed back) contributes one document, not two.
    fn dedupe_by_id(&mut self) {
        let mut last_write: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for (i, record) in self.buffer.iter().enumerate() {
            last_write.insert(record.id.as_str(), i);
        }
        if last_write.len() == self.buffer.len() {
            return;
        }
        let keep: std::collections::HashSet<usize> = last_write.into_values().collect();
        let mut i = 0;
        self.buffer.retain(|_| {
            let keep_this = keep.contains(&i);
            i += 1;
            keep_this
        });
    }

    /// Bulk-writes the buffer. Never returns an error that aborts the
    /// caller: backend-unavailable retries with the buffer intact; every
    /// other failure mode clears the buffer and counts against
    /// `files_failed`.
    pub async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.dedupe_by_id();

        loop {
            match self.write_buffer().await {
                Ok((written, failed)) => {
                    self.files_indexed += written;
                    self.files_failed += failed;
                    self.buffer.clear();
                    self.buffered_bytes = 0;
                    return;
                }
                Err(FlushError::BackendUnavailable(reason)) => {
                    warn!(
                        reason = %reason,
                        buffered = self.buffer.len(),
                        "index backend unavailable, retrying in 10s"
                    );
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    continue;
                }
                Err(FlushError::Fatal(reason)) => {
                    error!(
                        reason = %reason,
                        paths = ?self.buffer.iter().map(|r| r.path.clone()).collect::<Vec<_>>(),
                        "dropping batch after non-retriable error"
                    );
                    self.files_failed += self.buffer.len();
                    self.buffer.clear();
                    self.buffered_bytes = 0;
                    return;
                }
            }
        }
    }

    async fn write_buffer(&self) -> Result<(usize, usize), FlushError> {
        let writer = self.repo_index.writer.write().await;
        let fields = &self.repo_index.fields;
        let mut failed_ids = Vec::new();
        let mut written = 0;

        for record in &self.buffer {
            let term = tantivy::Term::from_field_text(fields.id, &record.id);
            let query = tantivy::query::TermQuery::new(term, tantivy::schema::IndexRecordOption::Basic);
            let _ = writer.delete_query(Box::new(query));

            let mut document = doc!(
                fields.id => record.id.clone(),
                fields.name => record.name.clone(),
                fields.extension => record.extension.clone(),
                fields.path => record.path.clone(),
                fields.project => record.project.clone(),
                fields.version => record.version.clone(),
                fields.size => record.size as u64,
            );
            if let Some(content) = &record.content {
                document.add_text(fields.content, content);
            }
            if let Some(last_author) = &record.last_author {
                document.add_text(fields.last_author, last_author);
            }
            if let Some(last_date) = &record.last_date {
                document.add_text(fields.last_date, last_date.to_rfc3339());
            }

            match writer.add_document(document) {
                Ok(_) => written += 1,
                Err(e) => failed_ids.push((record.id.clone(), e.to_string())),
            }
        }

        drop(writer);

        match self.repo_index.commit().await {
            Ok(()) => {
                if !failed_ids.is_empty() {
                    warn!(?failed_ids, "partial bulk failure during flush");
                }
                info!(written, failed = failed_ids.len(), "flushed batch");
                Ok((written, failed_ids.len()))
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("connection") || message.contains("unavailable") {
                    Err(FlushError::BackendUnavailable(message))
                } else {
                    Err(FlushError::Fatal(message))
                }
            }
        }
    }
}

enum FlushError {
    BackendUnavailable(String),
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::lifecycle::IndexLifecycle;
    use crate::models::{Repository, RepositoryKind};

    fn sample_record(id: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            name: "main.rs".to_string(),
            path: "/r/a/trunk/main.rs".to_string(),
            content: Some("fn main() {}".to_string()),
            project: "a".to_string(),
            version: "trunk".to_string(),
            extension: "rs".to_string(),
            size: 12,
            last_modified: None,
            last_author: None,
            last_date: None,
        }
    }

    #[tokio::test]
    async fn flush_clears_buffer_and_counts_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = IndexLifecycle::new(dir.path());
        let repo = Repository::new("a", RepositoryKind::FileSystem, "/r/a");
        let repo_index = lifecycle.open_or_create(&repo).await.unwrap();

        let mut indexer = BatchIndexer::new(repo_index, 100);
        indexer.add(sample_record("id-1")).await;
        indexer.add(sample_record("id-2")).await;
        indexer.flush().await;

        assert_eq!(indexer.files_indexed(), 2);
        assert_eq!(indexer.files_failed(), 0);
    }

    #[tokio::test]
    async fn same_id_twice_in_one_batch_collapses_to_last_write() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = IndexLifecycle::new(dir.path());
        let repo = Repository::new("a", RepositoryKind::FileSystem, "/r/a");
        let repo_index = lifecycle.open_or_create(&repo).await.unwrap();

        let mut indexer = BatchIndexer::new(repo_index, 100);
        let mut first = sample_record("id-1");
        first.content = Some("fn main() { v1 }".to_string());
        let mut second = sample_record("id-1");
        second.content = Some("fn main() { v2 }".to_string());
        indexer.add(first).await;
        indexer.add(second).await;
        indexer.flush().await;

        assert_eq!(indexer.files_indexed(), 1, "one logical document, not two");
    }

    #[tokio::test]
    async fn oversized_buffer_is_dropped_and_counted_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = IndexLifecycle::new(dir.path());
        let repo = Repository::new("a", RepositoryKind::FileSystem, "/r/a");
        let repo_index = lifecycle.open_or_create(&repo).await.unwrap();

        let mut indexer = BatchIndexer::new(repo_index, 100);
        let mut huge = sample_record("id-huge");
        huge.content = Some("x".repeat(MAX_BUFFER_BYTES + 1));
        indexer.add(huge).await;

        assert_eq!(indexer.files_indexed(), 0);
        assert_eq!(indexer.files_failed(), 1);
    }

    #[tokio::test]
    async fn add_auto_flushes_past_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = IndexLifecycle::new(dir.path());
        let repo = Repository::new("a", RepositoryKind::FileSystem, "/r/a");
        let repo_index = lifecycle.open_or_create(&repo).await.unwrap();

        let mut indexer = BatchIndexer::new(repo_index, 1);
        indexer.add(sample_record("id-1")).await;
        indexer.add(sample_record("id-2")).await;

        assert_eq!(indexer.files_indexed(), 2);
    }
}
