//! 授予领域

pub mod execution;
pub mod grant;
pub mod repository;

pub use execution::{
    AccessRequest, Decision, DecisionRecord, Execution, ExecutionId, ExecutionState, Transition,
};
pub use grant::{Grant, GrantId, GrantState};
pub use repository::{ExecutionRepository, GrantRepository};
