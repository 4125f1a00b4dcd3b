//! jit-bootstrap - 服务启动骨架
//!
//! 日志/指标初始化、数据库连接与迁移、关闭信号

mod infrastructure;
mod runtime;

pub use infrastructure::*;
pub use runtime::*;
