//! 内存仓储
//!
//! 未配置数据库时使用，也用于测试。同一实例可被多个编排器共享以模拟重启

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use jit_errors::{AppError, AppResult};
use tokio::sync::RwLock;

use crate::domain::catalog::{
    Catalog, CatalogKey, CatalogRepository, CatalogSession, CatalogSessionRepository, SessionId,
};
use crate::domain::grant::{Execution, ExecutionId, ExecutionRepository, Grant, GrantId, GrantRepository};

#[derive(Default)]
pub struct InMemoryExecutionRepository {
    records: RwLock<HashMap<ExecutionId, Execution>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn insert(&self, execution: &Execution) -> AppResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&execution.id) {
            return Err(AppError::conflict(format!("execution {} already exists", execution.id)));
        }
        records.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &Execution) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&execution.id)
            .ok_or_else(|| AppError::not_found(format!("execution {}", execution.id)))?;
        if stored.revision != execution.revision {
            return Err(AppError::conflict(format!(
                "execution {} revision {} is stale (current {})",
                execution.id, execution.revision, stored.revision
            )));
        }
        let mut next = execution.clone();
        next.revision += 1;
        let revision = next.revision;
        *stored = next;
        Ok(revision)
    }

    async fn get(&self, id: &ExecutionId) -> AppResult<Option<Execution>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list_unfinished(&self) -> AppResult<Vec<Execution>> {
        let mut unfinished: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|e| !e.state.is_terminal())
            .cloned()
            .collect();
        unfinished.sort_by_key(|e| e.created_at);
        Ok(unfinished)
    }
}

#[derive(Default)]
struct GrantTables {
    active: HashMap<GrantId, Grant>,
    archived: HashMap<GrantId, Grant>,
}

#[derive(Default)]
pub struct InMemoryGrantRepository {
    tables: RwLock<GrantTables>,
}

impl InMemoryGrantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantRepository for InMemoryGrantRepository {
    async fn save_active(&self, grant: &Grant) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.archived.contains_key(&grant.id) {
            return Err(AppError::conflict(format!("grant {} is already archived", grant.id)));
        }
        tables.active.insert(grant.id, grant.clone());
        Ok(())
    }

    async fn archive(&self, grant: &Grant) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.active.remove(&grant.id);
        tables.archived.insert(grant.id, grant.clone());
        Ok(())
    }

    async fn get(&self, id: &GrantId) -> AppResult<Option<Grant>> {
        let tables = self.tables.read().await;
        Ok(tables.active.get(id).or_else(|| tables.archived.get(id)).cloned())
    }

    async fn list_active(&self) -> AppResult<Vec<Grant>> {
        let mut grants: Vec<_> = self.tables.read().await.active.values().cloned().collect();
        grants.sort_by_key(|g| g.issued_at);
        Ok(grants)
    }

    async fn list_archived(&self) -> AppResult<Vec<Grant>> {
        let mut grants: Vec<_> = self.tables.read().await.archived.values().cloned().collect();
        grants.sort_by_key(|g| g.issued_at);
        Ok(grants)
    }
}

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    installed: RwLock<BTreeMap<CatalogKey, Catalog>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn save_installed(&self, catalog: &Catalog) -> AppResult<()> {
        self.installed
            .write()
            .await
            .insert(catalog.key.clone(), catalog.clone());
        Ok(())
    }

    async fn load_installed(&self) -> AppResult<Vec<Catalog>> {
        Ok(self.installed.read().await.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryCatalogSessionRepository {
    sessions: RwLock<BTreeMap<SessionId, CatalogSession>>,
}

impl InMemoryCatalogSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogSessionRepository for InMemoryCatalogSessionRepository {
    async fn save(&self, session: &CatalogSession) -> AppResult<()> {
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> AppResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn load_open(&self) -> AppResult<Vec<CatalogSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_open())
            .cloned()
            .collect())
    }
}
