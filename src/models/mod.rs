pub mod file;
pub mod repository;

pub use file::*;
pub use repository::*;
