//! 策略解析

pub mod effective;
pub mod resolver;

pub use effective::EffectivePolicy;
pub use resolver::Resolver;
