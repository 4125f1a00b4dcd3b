//! PostgreSQL 授予仓储

use async_trait::async_trait;
use jit_errors::AppResult;
use sqlx::PgPool;
use sqlx::types::Json;

use super::error_mapper::map_sqlx_error;
use crate::domain::grant::{Grant, GrantId, GrantRepository};

pub struct PostgresGrantRepository {
    pool: PgPool,
}

impl PostgresGrantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list(&self, archived: bool) -> AppResult<Vec<Grant>> {
        let rows: Vec<(Json<Grant>,)> = sqlx::query_as(
            "SELECT document FROM jit_grants WHERE archived = $1 ORDER BY expires_at ASC",
        )
        .bind(archived)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(Json(grant),)| grant).collect())
    }
}

#[async_trait]
impl GrantRepository for PostgresGrantRepository {
    async fn save_active(&self, grant: &Grant) -> AppResult<()> {
        // 已归档的授予不会被覆盖回活动状态
        sqlx::query(
            r#"
            INSERT INTO jit_grants (id, execution_id, archived, expires_at, document)
            VALUES ($1, $2, FALSE, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET expires_at = EXCLUDED.expires_at, document = EXCLUDED.document
            WHERE jit_grants.archived = FALSE
            "#,
        )
        .bind(grant.id.0)
        .bind(grant.execution_id.0)
        .bind(grant.expires_at)
        .bind(Json(grant))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn archive(&self, grant: &Grant) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jit_grants (id, execution_id, archived, expires_at, document)
            VALUES ($1, $2, TRUE, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET archived = TRUE, document = EXCLUDED.document
            "#,
        )
        .bind(grant.id.0)
        .bind(grant.execution_id.0)
        .bind(grant.expires_at)
        .bind(Json(grant))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, id: &GrantId) -> AppResult<Option<Grant>> {
        let row: Option<(Json<Grant>,)> = sqlx::query_as("SELECT document FROM jit_grants WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|(Json(grant),)| grant))
    }

    async fn list_active(&self) -> AppResult<Vec<Grant>> {
        self.list(false).await
    }

    async fn list_archived(&self) -> AppResult<Vec<Grant>> {
        self.list(true).await
    }
}
