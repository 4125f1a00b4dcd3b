//! jit-access - 即时访问授权服务
//!
//! 角色继承解析、审批与授予编排、provider 目录同步

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod provider;
