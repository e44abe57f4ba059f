//! 奖励策略模型
//!
//! 每种触发类型对应一份策略：是否启用、发放积分数、消息模板与激活延迟。
//! 引擎只读取策略，不校验取值（负数积分等按配置原样生效）。

use serde::{Deserialize, Serialize};

/// 触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    BlogComment,
    NewsComment,
    ProductReview,
    Registration,
    NewsletterSubscription,
    FirstPurchase,
    FastPurchase,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 7] = [
        Self::BlogComment,
        Self::NewsComment,
        Self::ProductReview,
        Self::Registration,
        Self::NewsletterSubscription,
        Self::FirstPurchase,
        Self::FastPurchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlogComment => "blog_comment",
            Self::NewsComment => "news_comment",
            Self::ProductReview => "product_review",
            Self::Registration => "registration",
            Self::NewsletterSubscription => "newsletter_subscription",
            Self::FirstPurchase => "first_purchase",
            Self::FastPurchase => "fast_purchase",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 激活延迟单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    #[default]
    Hours,
    Days,
}

impl DelayUnit {
    /// 单位换算为小时
    pub fn to_hours(&self) -> i64 {
        match self {
            Self::Hours => 1,
            Self::Days => 24,
        }
    }
}

/// 单个触发类型的奖励策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardPolicy {
    pub enabled: bool,
    pub points: i32,
    /// 可包含一个 `{0}` 占位符，发放时替换为关联实体标题
    pub message_template: String,
    /// 小于等于 0 表示立即激活
    pub activation_delay: i32,
    pub activation_delay_unit: DelayUnit,
    /// 快速购买的时间窗口（分钟），仅 FastPurchase 使用
    pub fast_purchase_window_minutes: Option<i32>,
}

impl Default for AwardPolicy {
    fn default() -> Self {
        Self::disabled("")
    }
}

impl AwardPolicy {
    /// 创建关闭状态、0 积分、立即激活的策略
    pub fn disabled(message_template: impl Into<String>) -> Self {
        Self {
            enabled: false,
            points: 0,
            message_template: message_template.into(),
            activation_delay: 0,
            activation_delay_unit: DelayUnit::Hours,
            fast_purchase_window_minutes: None,
        }
    }

    /// 创建启用状态的策略
    pub fn enabled(points: i32, message_template: impl Into<String>) -> Self {
        Self {
            enabled: true,
            points,
            ..Self::disabled(message_template)
        }
    }

    pub fn with_activation_delay(mut self, delay: i32, unit: DelayUnit) -> Self {
        self.activation_delay = delay;
        self.activation_delay_unit = unit;
        self
    }

    pub fn with_fast_purchase_window(mut self, minutes: i32) -> Self {
        self.fast_purchase_window_minutes = Some(minutes);
        self
    }

    /// 快速购买窗口，未配置时按 0 分钟处理
    pub fn fast_purchase_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.fast_purchase_window_minutes.unwrap_or(0) as i64)
    }
}

/// 默认消息模板
pub mod default_messages {
    pub const BLOG_COMMENT: &str = "Earned promotion for the comment to blog post {0}";
    pub const NEWS_COMMENT: &str = "Earned promotion for the comment to news {0}";
    pub const PRODUCT_REVIEW: &str = "Earned promotion for the review to product {0}";
    pub const REGISTRATION: &str = "Earned promotion for the registration";
    pub const NEWSLETTER_SUBSCRIPTION: &str = "Earned promotion for the newsletter subscription";
    pub const FIRST_PURCHASE: &str = "Earned promotion for the first purchase";
    pub const FAST_PURCHASE: &str = "Earned promotion for the fast purchase";
}

/// 默认快速购买窗口（分钟）
pub const DEFAULT_FAST_PURCHASE_WINDOW_MINUTES: i32 = 15;

/// 全部触发类型的策略集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySet {
    pub blog_comment: AwardPolicy,
    pub news_comment: AwardPolicy,
    pub product_review: AwardPolicy,
    pub registration: AwardPolicy,
    pub newsletter_subscription: AwardPolicy,
    pub first_purchase: AwardPolicy,
    pub fast_purchase: AwardPolicy,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            blog_comment: AwardPolicy::disabled(default_messages::BLOG_COMMENT),
            news_comment: AwardPolicy::disabled(default_messages::NEWS_COMMENT),
            product_review: AwardPolicy::disabled(default_messages::PRODUCT_REVIEW),
            registration: AwardPolicy::disabled(default_messages::REGISTRATION),
            newsletter_subscription: AwardPolicy::disabled(
                default_messages::NEWSLETTER_SUBSCRIPTION,
            ),
            first_purchase: AwardPolicy::disabled(default_messages::FIRST_PURCHASE),
            fast_purchase: AwardPolicy::disabled(default_messages::FAST_PURCHASE)
                .with_fast_purchase_window(DEFAULT_FAST_PURCHASE_WINDOW_MINUTES),
        }
    }
}

impl PolicySet {
    pub fn get(&self, kind: TriggerKind) -> &AwardPolicy {
        match kind {
            TriggerKind::BlogComment => &self.blog_comment,
            TriggerKind::NewsComment => &self.news_comment,
            TriggerKind::ProductReview => &self.product_review,
            TriggerKind::Registration => &self.registration,
            TriggerKind::NewsletterSubscription => &self.newsletter_subscription,
            TriggerKind::FirstPurchase => &self.first_purchase,
            TriggerKind::FastPurchase => &self.fast_purchase,
        }
    }

    pub fn get_mut(&mut self, kind: TriggerKind) -> &mut AwardPolicy {
        match kind {
            TriggerKind::BlogComment => &mut self.blog_comment,
            TriggerKind::NewsComment => &mut self.news_comment,
            TriggerKind::ProductReview => &mut self.product_review,
            TriggerKind::Registration => &mut self.registration,
            TriggerKind::NewsletterSubscription => &mut self.newsletter_subscription,
            TriggerKind::FirstPurchase => &mut self.first_purchase,
            TriggerKind::FastPurchase => &mut self.fast_purchase,
        }
    }

    /// 替换指定触发类型的策略（链式构建）
    pub fn with(mut self, kind: TriggerKind, policy: AwardPolicy) -> Self {
        *self.get_mut(kind) = policy;
        self
    }
}
