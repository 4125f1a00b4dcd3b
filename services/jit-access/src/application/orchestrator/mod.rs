//! 授权编排用例

pub mod service;
pub mod settings;

pub use service::GrantOrchestrator;
pub use settings::OrchestratorSettings;
