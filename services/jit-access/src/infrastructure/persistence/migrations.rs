//! jit-access 表结构
//!
//! 执行、授予、目录与会话都以 JSONB 文档保存，只把查询用到的列单独拆出

use jit_adapter_postgres::Migration;

const EXECUTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS jit_executions (
    id UUID PRIMARY KEY,
    state VARCHAR(32) NOT NULL,
    revision BIGINT NOT NULL,
    document JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jit_executions_state ON jit_executions (state);
"#;

const GRANTS: &str = r#"
CREATE TABLE IF NOT EXISTS jit_grants (
    id UUID PRIMARY KEY,
    execution_id UUID NOT NULL,
    archived BOOLEAN NOT NULL DEFAULT FALSE,
    expires_at TIMESTAMPTZ NOT NULL,
    document JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jit_grants_archived ON jit_grants (archived, expires_at);
"#;

const CATALOGS: &str = r#"
CREATE TABLE IF NOT EXISTS jit_catalogs (
    provider VARCHAR(255) NOT NULL,
    dataset VARCHAR(255) NOT NULL,
    version VARCHAR(255) NOT NULL,
    checksum VARCHAR(64) NOT NULL,
    document JSONB NOT NULL,
    installed_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (provider, dataset)
);
"#;

const CATALOG_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS jit_catalog_sessions (
    id UUID PRIMARY KEY,
    provider VARCHAR(255) NOT NULL,
    dataset VARCHAR(255) NOT NULL,
    document JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jit_catalog_sessions_key ON jit_catalog_sessions (provider, dataset);
"#;

pub fn migrations() -> Vec<Migration> {
    vec![
        Migration::new(1, "create_executions", EXECUTIONS),
        Migration::new(2, "create_grants", GRANTS),
        Migration::new(3, "create_catalogs", CATALOGS),
        Migration::new(4, "create_catalog_sessions", CATALOG_SESSIONS),
    ]
}
