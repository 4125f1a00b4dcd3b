//! 已安装的 provider 目录

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use jit_errors::SynchronizationError;
use serde::{Deserialize, Serialize};

use crate::domain::role::{Role, RoleId};

/// 未指定数据集时使用的名称
pub const DEFAULT_DATASET: &str = "default";

/// 目录键: (provider, dataset)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatalogKey {
    pub provider: String,
    pub dataset: String,
}

impl CatalogKey {
    pub fn new(provider: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            dataset: dataset.into(),
        }
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.dataset)
    }
}

/// provider 侧的权限条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PermissionEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
        }
    }
}

/// 同步会话传输的目录文档 (分块拼接后的 JSON)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<PermissionEntry>,
}

/// 已安装的目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub key: CatalogKey,
    pub version: String,
    pub checksum: String,
    pub roles: BTreeMap<RoleId, Role>,
    pub permissions: BTreeMap<String, PermissionEntry>,
    pub installed_at: DateTime<Utc>,
}

impl Catalog {
    /// 从解析后的文档构建目录
    pub fn from_document(
        key: CatalogKey,
        version: impl Into<String>,
        checksum: impl Into<String>,
        document: CatalogDocument,
    ) -> Result<Self, SynchronizationError> {
        let mut roles = BTreeMap::new();
        for role in document.roles {
            if role.id.as_str().is_empty() {
                return Err(SynchronizationError::MalformedCatalog(
                    "role with empty id".to_string(),
                ));
            }
            if roles.insert(role.id.clone(), role).is_some() {
                return Err(SynchronizationError::MalformedCatalog(
                    "duplicate role id in catalog".to_string(),
                ));
            }
        }

        let mut permissions = BTreeMap::new();
        for permission in document.permissions {
            if permission.id.is_empty() {
                return Err(SynchronizationError::MalformedCatalog(
                    "permission with empty id".to_string(),
                ));
            }
            permissions.insert(permission.id.clone(), permission);
        }

        Ok(Self {
            key,
            version: version.into(),
            checksum: checksum.into(),
            roles,
            permissions,
            installed_at: Utc::now(),
        })
    }

    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn permission(&self, id: &str) -> Option<&PermissionEntry> {
        self.permissions.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_roles_are_rejected() {
        let document = CatalogDocument {
            roles: vec![Role::new("a"), Role::new("a")],
            permissions: vec![],
        };
        let result = Catalog::from_document(CatalogKey::new("aws", DEFAULT_DATASET), "v1", "x", document);
        assert!(matches!(result, Err(SynchronizationError::MalformedCatalog(_))));
    }

    #[test]
    fn test_document_accepts_missing_sections() {
        let document: CatalogDocument = serde_json::from_str(r#"{"roles":[{"id":"reader"}]}"#).unwrap();
        let catalog =
            Catalog::from_document(CatalogKey::new("aws", DEFAULT_DATASET), "v1", "x", document).unwrap();
        assert!(catalog.role(&RoleId::new("reader")).is_some());
        assert!(catalog.permissions.is_empty());
    }
}
