//! PostgreSQL 执行记录仓储

use async_trait::async_trait;
use jit_errors::{AppError, AppResult};
use sqlx::PgPool;
use sqlx::types::Json;

use super::error_mapper::map_sqlx_error;
use crate::domain::grant::{Execution, ExecutionId, ExecutionRepository};

pub struct PostgresExecutionRepository {
    pool: PgPool,
}

impl PostgresExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PostgresExecutionRepository {
    async fn insert(&self, execution: &Execution) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jit_executions (id, state, revision, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(execution.id.0)
        .bind(execution.state.as_str())
        .bind(execution.revision as i64)
        .bind(Json(execution))
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, execution: &Execution) -> AppResult<u64> {
        let mut next = execution.clone();
        next.revision += 1;

        let result = sqlx::query(
            r#"
            UPDATE jit_executions
            SET state = $2, revision = $3, document = $4, updated_at = $5
            WHERE id = $1 AND revision = $6
            "#,
        )
        .bind(next.id.0)
        .bind(next.state.as_str())
        .bind(next.revision as i64)
        .bind(Json(&next))
        .bind(next.updated_at)
        .bind(execution.revision as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.get(&execution.id).await? {
                Some(current) => Err(AppError::conflict(format!(
                    "execution {} revision {} is stale (current {})",
                    execution.id, execution.revision, current.revision
                ))),
                None => Err(AppError::not_found(format!("execution {}", execution.id))),
            };
        }
        Ok(next.revision)
    }

    async fn get(&self, id: &ExecutionId) -> AppResult<Option<Execution>> {
        let row: Option<(Json<Execution>,)> =
            sqlx::query_as("SELECT document FROM jit_executions WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(|(Json(execution),)| execution))
    }

    async fn list_unfinished(&self) -> AppResult<Vec<Execution>> {
        let rows: Vec<(Json<Execution>,)> = sqlx::query_as(
            r#"
            SELECT document FROM jit_executions
            WHERE state NOT IN ('revoked', 'failed')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(Json(execution),)| execution).collect())
    }
}
