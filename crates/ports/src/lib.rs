//! ports - 抽象 trait 层
//!
//! 定义服务共享的基础设施抽象接口

mod alert;

pub use alert::*;
