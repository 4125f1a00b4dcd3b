//! 目录同步器
//!
//! 分块推送协议: start -> push_chunk* -> commit。提交时校验 SHA-256、解析文档，
//! 成功后作为新快照原子安装；任何失败都中止会话，已安装目录保持不变

use std::collections::BTreeMap;
use std::sync::Arc;

use jit_common::Pagination;
use jit_config::CatalogConfig;
use jit_errors::{AppError, AppResult, SynchronizationError};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::catalog::{
    checksum_of, Catalog, CatalogDocument, CatalogKey, CatalogRepository, CatalogSession,
    CatalogSessionRepository, SessionId, DEFAULT_DATASET,
};
use crate::domain::role::RoleRegistry;
use crate::provider::{ProviderRegistry, RoleBasedAccessControl};

/// 开启同步会话的参数
#[derive(Debug, Clone)]
pub struct StartSession {
    pub provider: String,
    pub dataset: Option<String>,
    pub version: String,
}

impl StartSession {
    pub fn new(provider: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            dataset: None,
            version: version.into(),
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    fn key(&self) -> CatalogKey {
        CatalogKey::new(
            self.provider.clone(),
            self.dataset.clone().unwrap_or_else(|| DEFAULT_DATASET.to_string()),
        )
    }
}

pub struct CatalogSynchronizer {
    roles: Arc<RoleRegistry>,
    providers: Arc<ProviderRegistry>,
    catalogs: Arc<dyn CatalogRepository>,
    session_store: Arc<dyn CatalogSessionRepository>,
    sessions: Mutex<BTreeMap<SessionId, CatalogSession>>,
    config: CatalogConfig,
}

impl CatalogSynchronizer {
    pub fn new(
        roles: Arc<RoleRegistry>,
        providers: Arc<ProviderRegistry>,
        catalogs: Arc<dyn CatalogRepository>,
        session_store: Arc<dyn CatalogSessionRepository>,
        config: CatalogConfig,
    ) -> Self {
        Self {
            roles,
            providers,
            catalogs,
            session_store,
            sessions: Mutex::new(BTreeMap::new()),
            config,
        }
    }

    /// 恢复已安装目录与未完成的会话，返回 (目录数, 会话数)
    pub async fn restore(&self) -> AppResult<(usize, usize)> {
        let installed = self.catalogs.load_installed().await?;
        let catalog_count = installed.len();
        for catalog in installed {
            self.roles.install_catalog(catalog);
        }

        let open = self.session_store.load_open().await?;
        let mut sessions = self.sessions.lock().await;
        for session in open.into_iter().filter(CatalogSession::is_open) {
            sessions.insert(session.id, session);
        }
        info!(catalogs = catalog_count, sessions = sessions.len(), "Catalog state restored");
        Ok((catalog_count, sessions.len()))
    }

    /// 开启会话，同一 (provider, dataset) 同时只允许一个打开的会话
    pub async fn start(&self, request: StartSession) -> AppResult<SessionId> {
        if request.provider.trim().is_empty() {
            return Err(AppError::validation("provider must not be empty"));
        }
        if request.version.trim().is_empty() {
            return Err(AppError::validation("version must not be empty"));
        }

        let key = request.key();
        let mut sessions = self.sessions.lock().await;
        if sessions.values().any(|s| s.key == key && s.is_open()) {
            return Err(SynchronizationError::SessionAlreadyOpen {
                provider: key.provider,
                dataset: key.dataset,
            }
            .into());
        }

        let session = CatalogSession::open(key, request.version);
        self.session_store.save(&session).await?;
        let id = session.id;
        info!(session = %id, catalog = %session.key, version = %session.version, "Catalog session opened");
        sessions.insert(id, session);
        Ok(id)
    }

    /// 追加分块，序号必须恰好是下一个
    ///
    /// 存储失败时会话保持原样，调用方可用同一序号重试
    pub async fn push_chunk(&self, id: &SessionId, sequence: u64, payload: Vec<u8>) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().await;
        let mut next = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SynchronizationError::SessionNotFound(id.to_string()))?;

        if let Err(e) = next.accept_chunk(sequence, payload) {
            self.discard(&mut sessions, id, &e).await;
            return Err(e.into());
        }
        self.session_store.save(&next).await?;
        sessions.insert(next.id, next);
        Ok(true)
    }

    /// 校验并安装，返回安装的版本
    pub async fn commit(&self, id: &SessionId, checksum: &str) -> AppResult<String> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get(id)
            .ok_or_else(|| SynchronizationError::SessionNotFound(id.to_string()))?;
        if !session.is_open() {
            return Err(SynchronizationError::SessionClosed(id.to_string()).into());
        }

        let actual = session.checksum();
        if !actual.eq_ignore_ascii_case(checksum.trim()) {
            let err = SynchronizationError::ChecksumMismatch {
                expected: checksum.to_string(),
                actual,
            };
            self.discard(&mut sessions, id, &err).await;
            return Err(err.into());
        }

        let catalog = serde_json::from_slice::<CatalogDocument>(&session.assemble())
            .map_err(|e| SynchronizationError::MalformedCatalog(e.to_string()))
            .and_then(|document| {
                Catalog::from_document(session.key.clone(), session.version.clone(), actual, document)
            });
        let catalog = match catalog {
            Ok(catalog) => catalog,
            Err(e) => {
                self.discard(&mut sessions, id, &e).await;
                return Err(e.into());
            }
        };

        // 先持久化再发布，保证重启后能恢复到同一版本
        self.catalogs.save_installed(&catalog).await?;
        let version = catalog.version.clone();
        let key = catalog.key.clone();
        let graph_version = self.roles.install_catalog(catalog);

        if let Some(mut session) = sessions.remove(id) {
            session.mark_committed();
        }
        if let Err(e) = self.session_store.remove(id).await {
            warn!(session = %id, error = %e, "Failed to remove committed session");
        }
        counter!("jit_catalog_commits_total", "outcome" => "committed").increment(1);
        info!(session = %id, catalog = %key, version = %version, graph_version, "Catalog session committed");
        Ok(version)
    }

    /// 主动中止会话
    pub async fn abort(&self, id: &SessionId, reason: &str) -> AppResult<()> {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(id) {
            return Err(SynchronizationError::SessionNotFound(id.to_string()).into());
        }
        self.discard(&mut sessions, id, reason).await;
        Ok(())
    }

    pub async fn open_sessions(&self) -> Vec<CatalogSession> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// 从 provider 的 RBAC 能力拉取完整目录并走同一套分块协议
    pub async fn pull(&self, provider: &str, dataset: Option<&str>, version: &str) -> AppResult<String> {
        let rbac = self.providers.dispatch::<dyn RoleBasedAccessControl>(provider)?;
        let page_size = self.config.page_size.max(1);

        let mut document = CatalogDocument::default();
        let mut page = Pagination::new(1, page_size);
        loop {
            let result = rbac.list_roles(&page).await?;
            let more = result.has_more() && !result.items.is_empty();
            document.roles.extend(result.items);
            if !more {
                break;
            }
            page = page.next();
        }

        let mut page = Pagination::new(1, page_size);
        loop {
            let result = rbac.list_permissions(&page).await?;
            let more = result.has_more() && !result.items.is_empty();
            document.permissions.extend(result.items);
            if !more {
                break;
            }
            page = page.next();
        }

        let bytes = serde_json::to_vec(&document)
            .map_err(|e| AppError::internal(format!("Failed to encode catalog: {}", e)))?;
        let chunk_size = self.config.chunk_size.max(1);

        let mut request = StartSession::new(provider, version);
        if let Some(dataset) = dataset {
            request = request.with_dataset(dataset);
        }
        let id = self.start(request).await?;
        let result = self.push_and_commit(&id, &bytes, chunk_size).await;
        if let Err(e) = &result {
            // 分块或提交失败时会话可能仍然打开，释放 (provider, dataset) 以便再次拉取
            match self.abort(&id, &format!("pull failed: {}", e)).await {
                Ok(()) | Err(AppError::Synchronization(SynchronizationError::SessionNotFound(_))) => {}
                Err(abort_err) => warn!(session = %id, error = %abort_err, "Failed to abort pulled session"),
            }
        }
        result
    }

    async fn push_and_commit(&self, id: &SessionId, bytes: &[u8], chunk_size: usize) -> AppResult<String> {
        for (sequence, chunk) in bytes.chunks(chunk_size).enumerate() {
            self.push_chunk(id, sequence as u64, chunk.to_vec()).await?;
        }
        self.commit(id, &checksum_of(bytes.chunks(chunk_size))).await
    }

    async fn discard(
        &self,
        sessions: &mut BTreeMap<SessionId, CatalogSession>,
        id: &SessionId,
        reason: &(impl std::fmt::Display + ?Sized),
    ) {
        if let Some(mut session) = sessions.remove(id) {
            session.abort(reason.to_string());
            warn!(session = %id, catalog = %session.key, reason = %reason, "Catalog session aborted");
        }
        if let Err(e) = self.session_store.remove(id).await {
            warn!(session = %id, error = %e, "Failed to remove aborted session");
        }
        counter!("jit_catalog_commits_total", "outcome" => "aborted").increment(1);
    }
}
