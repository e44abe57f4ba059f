//! 积分奖励领域模型
//!
//! 包含奖励策略、日期奖励规则、入站事件与发放指令定义

pub mod award;
pub mod date_rule;
pub mod entities;
pub mod events;
pub mod policy;

// 重新导出常用类型
pub use award::{AwardCommand, AwardOutcome, SkipReason, TriggerOutcome};
pub use date_rule::{DateAwardRule, DateRuleQuery, NewDateAwardRule};
pub use entities::{ContentItem, Customer, LanguageId, Store};
pub use events::{
    BlogCommentApproved, CartItemInserted, CustomerRegistered, NewsCommentApproved,
    NewsletterSubscribed, OrderPaid, ProductReviewApproved, RewardEvent,
};
pub use policy::{
    AwardPolicy, DEFAULT_FAST_PURCHASE_WINDOW_MINUTES, DelayUnit, PolicySet, TriggerKind,
    default_messages,
};
