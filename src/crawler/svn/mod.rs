pub mod client;
pub mod delta;
pub mod driver;
pub mod parser;

pub use client::SvnClient;
pub use delta::{FileRecordCollector, SvnDeltaEditor};
pub use driver::{SvnCrawlStats, SvnIncrementalDriver};
