//! PostgreSQL 目录与同步会话仓储

use async_trait::async_trait;
use jit_errors::AppResult;
use sqlx::PgPool;
use sqlx::types::Json;

use super::error_mapper::map_sqlx_error;
use crate::domain::catalog::{
    Catalog, CatalogRepository, CatalogSession, CatalogSessionRepository, SessionId,
};

pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn save_installed(&self, catalog: &Catalog) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jit_catalogs (provider, dataset, version, checksum, document, installed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider, dataset) DO UPDATE
            SET version = EXCLUDED.version,
                checksum = EXCLUDED.checksum,
                document = EXCLUDED.document,
                installed_at = EXCLUDED.installed_at
            "#,
        )
        .bind(&catalog.key.provider)
        .bind(&catalog.key.dataset)
        .bind(&catalog.version)
        .bind(&catalog.checksum)
        .bind(Json(catalog))
        .bind(catalog.installed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_installed(&self) -> AppResult<Vec<Catalog>> {
        let rows: Vec<(Json<Catalog>,)> =
            sqlx::query_as("SELECT document FROM jit_catalogs ORDER BY provider, dataset")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(Json(catalog),)| catalog).collect())
    }
}

pub struct PostgresCatalogSessionRepository {
    pool: PgPool,
}

impl PostgresCatalogSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogSessionRepository for PostgresCatalogSessionRepository {
    async fn save(&self, session: &CatalogSession) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jit_catalog_sessions (id, provider, dataset, document, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE
            SET document = EXCLUDED.document, updated_at = NOW()
            "#,
        )
        .bind(session.id.0)
        .bind(&session.key.provider)
        .bind(&session.key.dataset)
        .bind(Json(session))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> AppResult<()> {
        sqlx::query("DELETE FROM jit_catalog_sessions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_open(&self) -> AppResult<Vec<CatalogSession>> {
        let rows: Vec<(Json<CatalogSession>,)> =
            sqlx::query_as("SELECT document FROM jit_catalog_sessions ORDER BY updated_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(Json(session),)| session)
            .filter(CatalogSession::is_open)
            .collect())
    }
}
