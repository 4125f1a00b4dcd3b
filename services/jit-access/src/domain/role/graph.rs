//! 角色图快照
//!
//! 快照一经发布不再修改，新版本通过克隆后整体替换

use std::collections::BTreeMap;
use std::sync::Arc;

use super::role::{Role, RoleId};
use super::workflow::{WorkflowDefinition, WorkflowId};
use crate::domain::catalog::{Catalog, CatalogKey};

#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    pub(super) version: u64,
    pub(super) roles: BTreeMap<RoleId, Role>,
    pub(super) workflows: BTreeMap<WorkflowId, WorkflowDefinition>,
    pub(super) catalogs: BTreeMap<CatalogKey, Arc<Catalog>>,
}

impl RoleGraph {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// 查找角色，管理员定义优先于目录角色
    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles
            .get(id)
            .or_else(|| self.catalogs.values().find_map(|catalog| catalog.role(id)))
    }

    pub fn workflow(&self, id: &WorkflowId) -> Option<&WorkflowDefinition> {
        self.workflows.get(id)
    }

    pub fn catalog(&self, key: &CatalogKey) -> Option<&Arc<Catalog>> {
        self.catalogs.get(key)
    }

    pub fn catalogs(&self) -> impl Iterator<Item = &Arc<Catalog>> {
        self.catalogs.values()
    }

    /// 管理员定义的角色
    pub fn administrative_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn role_count(&self) -> usize {
        self.roles.len() + self.catalogs.values().map(|c| c.roles.len()).sum::<usize>()
    }
}
