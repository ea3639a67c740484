//! Error taxonomy for the crawl-and-index core.
//!
//! Component methods return [`CrawlError`] at the unit-level boundaries named
//! in the design (a single file, a single project, a single branch); plumbing
//! above those boundaries uses `anyhow::Result`. Nothing originating inside
//! [`crate::index::batch::BatchIndexer`] is allowed to propagate as an `Err`
//! that aborts the calling crawl — failures there are folded into
//! `numberOfFailedDocuments` and logged instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient transport error: {0}")]
    TransientTransport(String),

    #[error("remote protocol error: {0}")]
    RemoteProtocol(String),

    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("index backend failure: {0}")]
    IndexBackendFailure(String),

    #[error("crawl was cancelled")]
    Cancelled,

    #[error("buffer exhausted available memory, dropped: {0}")]
    OutOfMemory(String),
}

impl CrawlError {
    /// Whether this error should terminate the whole crawl (vs. just the
    /// unit currently being processed).
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::Configuration(_) | CrawlError::Cancelled)
    }
}
