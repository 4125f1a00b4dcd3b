//! 内置 provider 实现

pub mod log;

pub use log::{builtin_factory, DryRunAuthorizer, LogNotifier, DRY_RUN_KIND, LOG_KIND};
