//! Provider 插件层

pub mod capability;
pub mod factory;
pub mod registry;
pub mod settings;

pub use capability::{
    ApprovalNotification, Authorizer, CallContext, Capability, GrantHandle, IdentityDirectory,
    Notifier, RoleBasedAccessControl,
};
pub use factory::{ProviderConstructor, ProviderFactory};
pub use registry::{CapabilityPort, Provider, ProviderEntry, ProviderRegistry};
pub use settings::ProviderSettings;
