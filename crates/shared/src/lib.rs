//! 共享库
//!
//! 包含积分奖励引擎各组件共用的配置加载、错误处理、Redis 键值存储与可观测性基础设施代码。

pub mod config;
pub mod error;
pub mod observability;
pub mod redis_store;
