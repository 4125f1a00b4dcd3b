//! 基础设施层

pub mod alert;
pub mod persistence;
pub mod providers;

pub use alert::TracingAlertSink;
