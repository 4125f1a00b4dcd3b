//! 角色领域

pub mod graph;
pub mod identity;
pub mod pattern;
pub mod registry;
pub mod role;
pub mod workflow;

pub use graph::RoleGraph;
pub use identity::{Group, Identity, User};
pub use pattern::{Pattern, PatternRules, ResolvedPatterns};
pub use registry::RoleRegistry;
pub use role::{Role, RoleId, Scopes};
pub use workflow::{WorkflowDefinition, WorkflowId, WorkflowStep};
