//! 角色注册表
//!
//! 读取方拿到的是 `Arc<RoleGraph>` 快照，解析全程只看同一版本；
//! 写入串行化，构建好新图后一次性替换

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use jit_errors::{AppError, AppResult};
use metrics::counter;
use tracing::{debug, info};

use super::graph::RoleGraph;
use super::identity::Identity;
use super::role::{Role, RoleId};
use super::workflow::WorkflowDefinition;
use crate::domain::catalog::{Catalog, CatalogKey};
use crate::domain::policy::{EffectivePolicy, Resolver};

#[derive(Debug, Default)]
pub struct RoleRegistry {
    current: RwLock<Arc<RoleGraph>>,
    writer: Mutex<()>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<RoleGraph> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// 在当前快照上解析有效策略
    pub fn resolve(&self, role_id: &RoleId, identity: &Identity) -> AppResult<EffectivePolicy> {
        let graph = self.snapshot();
        let result = Resolver::new(&graph).resolve(role_id, identity);

        let outcome = match &result {
            Ok(_) => "resolved",
            Err(AppError::Resolution(_)) => "rejected",
            Err(_) => "error",
        };
        counter!("jit_resolutions_total", "outcome" => outcome).increment(1);
        debug!(
            role = %role_id,
            subject = %identity.subject(),
            graph_version = graph.version(),
            outcome,
            "Role resolution finished"
        );
        result
    }

    /// 替换全部管理员定义的角色与流程
    pub fn replace_administrative(
        &self,
        roles: impl IntoIterator<Item = Role>,
        workflows: impl IntoIterator<Item = WorkflowDefinition>,
    ) -> u64 {
        let roles: Vec<_> = roles.into_iter().collect();
        let workflows: Vec<_> = workflows.into_iter().collect();
        self.apply(move |graph| {
            graph.roles = roles.into_iter().map(|r| (r.id.clone(), r)).collect();
            graph.workflows = workflows.into_iter().map(|w| (w.id.clone(), w)).collect();
        })
    }

    pub fn upsert_role(&self, role: Role) -> u64 {
        self.apply(move |graph| {
            graph.roles.insert(role.id.clone(), role);
        })
    }

    pub fn remove_role(&self, id: &RoleId) -> u64 {
        self.apply(|graph| {
            graph.roles.remove(id);
        })
    }

    pub fn upsert_workflow(&self, workflow: WorkflowDefinition) -> u64 {
        self.apply(move |graph| {
            graph.workflows.insert(workflow.id.clone(), workflow);
        })
    }

    /// 原子地安装 (或替换) 一个 provider 目录
    pub fn install_catalog(&self, catalog: Catalog) -> u64 {
        let key = catalog.key.clone();
        let version = catalog.version.clone();
        let role_count = catalog.roles.len();
        let graph_version = self.apply(move |graph| {
            graph.catalogs.insert(catalog.key.clone(), Arc::new(catalog));
        });
        info!(
            catalog = %key,
            catalog_version = %version,
            roles = role_count,
            graph_version,
            "Catalog installed"
        );
        graph_version
    }

    pub fn catalog(&self, key: &CatalogKey) -> Option<Arc<Catalog>> {
        self.snapshot().catalog(key).cloned()
    }

    /// 已安装目录的版本
    pub fn installed_version(&self, key: &CatalogKey) -> Option<String> {
        self.snapshot().catalog(key).map(|c| c.version.clone())
    }

    fn apply<F>(&self, mutate: F) -> u64
    where
        F: FnOnce(&mut RoleGraph),
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = RoleGraph::clone(&self.snapshot());
        mutate(&mut next);
        next.version += 1;
        let version = next.version;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CatalogDocument, DEFAULT_DATASET};

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let registry = RoleRegistry::new();
        registry.upsert_role(Role::new("reader").allow_permission("s3:Get*"));

        let before = registry.snapshot();
        registry.upsert_role(Role::new("reader").allow_permission("s3:*"));

        let reader = RoleId::new("reader");
        assert!(before.role(&reader).unwrap().permissions.allow.contains("s3:Get*"));
        assert!(registry.snapshot().role(&reader).unwrap().permissions.allow.contains("s3:*"));
        assert_eq!(registry.version(), before.version() + 1);
    }

    #[test]
    fn test_administrative_role_wins_over_catalog() {
        let registry = RoleRegistry::new();
        registry.upsert_role(Role::new("admin").allow_permission("iam:*"));

        let document = CatalogDocument {
            roles: vec![Role::new("admin").allow_permission("s3:*"), Role::new("viewer")],
            permissions: vec![],
        };
        let catalog =
            Catalog::from_document(CatalogKey::new("aws", DEFAULT_DATASET), "v1", "sum", document).unwrap();
        registry.install_catalog(catalog);

        let graph = registry.snapshot();
        let admin = graph.role(&RoleId::new("admin")).unwrap();
        assert!(admin.permissions.allow.contains("iam:*"));
        assert!(graph.role(&RoleId::new("viewer")).is_some());
        assert_eq!(
            registry.installed_version(&CatalogKey::new("aws", DEFAULT_DATASET)).as_deref(),
            Some("v1")
        );
    }
}
