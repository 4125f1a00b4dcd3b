//! 目录同步用例

pub mod synchronizer;

pub use synchronizer::{CatalogSynchronizer, StartSession};
