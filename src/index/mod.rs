pub mod batch;
pub mod lifecycle;
pub mod schema;

pub use batch::BatchIndexer;
pub use lifecycle::{IndexLifecycle, RepoIndex};
