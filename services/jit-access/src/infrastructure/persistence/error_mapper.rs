//! SQLx 错误到 AppError 的映射

use jit_errors::AppError;

pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::not_found("Record not found"),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => AppError::conflict("Duplicate entry violates unique constraint"),
            Some("40001") => AppError::conflict("Serialization failure, retry the transaction"),
            Some(code) => AppError::database(format!("Database error ({}): {}", code, db_err)),
            None => AppError::database(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut => AppError::database("Database connection pool timeout"),
        sqlx::Error::PoolClosed => AppError::internal("Database connection pool is closed"),
        sqlx::Error::ColumnDecode { index, source } => {
            AppError::internal(format!("Failed to decode column {}: {}", index, source))
        }
        _ => AppError::database(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found() {
        assert!(matches!(map_sqlx_error(sqlx::Error::RowNotFound), AppError::NotFound(_)));
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }
}
