//! API 层

pub mod http;

pub use http::{router, AppState};
