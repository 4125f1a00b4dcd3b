//! 目录领域

pub mod catalog;
pub mod repository;
pub mod session;

pub use catalog::{Catalog, CatalogDocument, CatalogKey, PermissionEntry, DEFAULT_DATASET};
pub use repository::{CatalogRepository, CatalogSessionRepository};
pub use session::{checksum_of, CatalogSession, SessionId, SessionState};
