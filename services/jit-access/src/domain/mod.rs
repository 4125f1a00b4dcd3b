//! 领域层

pub mod catalog;
pub mod grant;
pub mod policy;
pub mod role;
