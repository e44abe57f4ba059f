//! 积分奖励引擎
//!
//! 根据业务事件决定是否向客户发放积分、发放多少、何时激活，并保证不重复发放。
//!
//! ## 核心功能
//!
//! - **事件奖励**：博客/新闻评论、商品评价、注册、订阅、首次购买、快速购买
//! - **激活延迟**：按小时或天计算积分的激活时间
//! - **幂等发放**：实体级标记以 抢占 → 发放 → 提交 协议写入，并发重复事件只发放一次
//! - **指定日期奖励**：定时清扫到期规则，按店铺 × 客户批量发放
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `scheduler`: 时钟与激活时间计算
//! - `attributes`: 实体属性存储（内存 / Redis）
//! - `tracker`: 幂等标记跟踪
//! - `ports`: 外部协作方接口
//! - `localization`: 消息本地化
//! - `date_rules`: 日期奖励规则仓储
//! - `settings`: 引擎配置与策略热更新
//! - `evaluator`: 规则评估器
//! - `sweep`: 指定日期奖励清扫
//! - `worker`: 清扫 Worker
//! - `testing`: 内存协作方与测试环境

pub mod attributes;
pub mod date_rules;
pub mod error;
pub mod evaluator;
pub mod localization;
pub mod models;
pub mod ports;
pub mod scheduler;
pub mod settings;
pub mod sweep;
pub mod testing;
pub mod tracker;
pub mod worker;

pub use attributes::{
    AttributeKey, AttributeStore, EntityType, MarkState, MemoryAttributeStore,
    RedisAttributeStore,
};
pub use date_rules::{DateRuleRepository, MemoryDateRuleRepository};
pub use error::{Result, RewardError};
pub use evaluator::{OrderPaidOutcome, RuleEvaluator};
pub use localization::{Localizer, PassthroughLocalizer, ResourceLocalizer, format_message};
pub use ports::{
    CartLookup, Collaborators, ContentCatalog, CustomerDirectory, OrderLookup, RewardLedger,
    StoreDirectory,
};
pub use scheduler::{ActivationScheduler, Clock, FixedClock, SystemClock, activation_time};
pub use settings::{DynamicPolicies, RewardSettings, SweepSettings};
pub use sweep::{DateAwardSweep, SweepReport};
pub use tracker::{IdempotencyTracker, MarkClaim};
pub use worker::SweepWorker;
