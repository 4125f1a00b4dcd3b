//! 基于日志的运维告警

use async_trait::async_trait;
use jit_errors::AppResult;
use jit_ports::{AlertPort, OperatorAlert};
use tracing::error;

/// 把告警写入 error 级别日志，由日志管道转发给值班
#[derive(Debug, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertPort for TracingAlertSink {
    async fn raise(&self, alert: &OperatorAlert) -> AppResult<()> {
        error!(
            alert_key = %alert.key,
            summary = %alert.summary,
            detail = %alert.detail,
            raised_at = %alert.raised_at,
            "Operator intervention required"
        );
        Ok(())
    }
}
