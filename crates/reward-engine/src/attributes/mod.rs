//! 实体属性存储
//!
//! 以 `(实体类型, 实体 ID, 属性名, 店铺 ID)` 为键保存幂等标记与临时时间戳。
//! 幂等标记分两步写入：先原子抢占（Claimed），发放成功后再提交为 Awarded；
//! 发放失败则释放抢占，保证"已标记"一定对应一次成功的发放。
//!
//! ## 实现
//!
//! - `MemoryAttributeStore`：基于 DashMap entry API，单进程内按键原子
//! - `RedisAttributeStore`：基于 SET NX PX / Lua CAS / GETDEL，多实例共享

mod memory;
mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use memory::MemoryAttributeStore;
pub use redis::RedisAttributeStore;

/// 属性所属实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    BlogComment,
    NewsComment,
    ProductReview,
    NewsletterSubscription,
    Order,
    Customer,
    DateAwardRule,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlogComment => "blog_comment",
            Self::NewsComment => "news_comment",
            Self::ProductReview => "product_review",
            Self::NewsletterSubscription => "newsletter_subscription",
            Self::Order => "order",
            Self::Customer => "customer",
            Self::DateAwardRule => "date_award_rule",
        }
    }
}

/// 属性名
pub mod keys {
    pub const CUSTOMER_AWARDED_FOR_BLOG_COMMENT: &str = "CustomerAwardedForBlogComment";
    pub const CUSTOMER_AWARDED_FOR_NEWS_COMMENT: &str = "CustomerAwardedForNewsComment";
    pub const CUSTOMER_AWARDED_FOR_PRODUCT_REVIEW: &str = "CustomerAwardedForProductReview";
    pub const CUSTOMER_AWARDED_FOR_SUBSCRIPTION: &str = "CustomerAwardedForSubscription";
    pub const CUSTOMER_AWARDED_FOR_FIRST_PURCHASE: &str = "CustomerAwardedForFirstPurchase";
    pub const CUSTOMER_AWARDED_ON_DATE: &str = "CustomerAwardedOnDate";
    pub const PURCHASE_START_TIME: &str = "PurchaseStartTime";
}

/// 属性键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub key: String,
    pub store_id: i64,
}

impl AttributeKey {
    pub fn new(
        entity_type: EntityType,
        entity_id: i64,
        key: impl Into<String>,
        store_id: i64,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            key: key.into(),
            store_id,
        }
    }

    /// 客户在某店铺的购物开始时间
    pub fn purchase_start(customer_id: i64, store_id: i64) -> Self {
        Self::new(
            EntityType::Customer,
            customer_id,
            keys::PURCHASE_START_TIME,
            store_id,
        )
    }

    /// 日期奖励规则在某店铺对某客户的发放标记
    pub fn date_award_recipient(rule_id: i64, store_id: i64, customer_id: i64) -> Self {
        Self::new(
            EntityType::DateAwardRule,
            rule_id,
            format!("{}:{}", keys::CUSTOMER_AWARDED_ON_DATE, customer_id),
            store_id,
        )
    }

    /// 扁平化的存储键
    pub fn storage_key(&self) -> String {
        format!(
            "attr:{}:{}:{}:{}",
            self.entity_type.as_str(),
            self.entity_id,
            self.key,
            self.store_id
        )
    }
}

impl std::fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// 幂等标记状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkState {
    /// 已被某个处理方抢占，发放进行中
    Claimed { claim_id: String },
    /// 已发放
    Awarded,
}

/// 属性存储接口
///
/// 所有条件写入必须是单键原子操作。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// 查询标记状态，已过期的抢占视为不存在
    async fn mark_state(&self, key: &AttributeKey, now: DateTime<Utc>)
    -> Result<Option<MarkState>>;

    /// 原子抢占：键不存在或抢占已过期时写入 Claimed，返回是否成功
    async fn try_claim(
        &self,
        key: &AttributeKey,
        claim_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// 原子提交：仍由 `claim_id` 持有时改为 Awarded，返回是否成功
    async fn commit_claim(&self, key: &AttributeKey, claim_id: &str) -> Result<bool>;

    /// 原子释放：仍由 `claim_id` 持有时删除，返回是否成功
    async fn release_claim(&self, key: &AttributeKey, claim_id: &str) -> Result<bool>;

    /// 写入时间戳（覆盖）
    async fn set_timestamp(&self, key: &AttributeKey, value: DateTime<Utc>) -> Result<()>;

    async fn get_timestamp(&self, key: &AttributeKey) -> Result<Option<DateTime<Utc>>>;

    /// 原子读取并清除时间戳
    async fn take_timestamp(&self, key: &AttributeKey) -> Result<Option<DateTime<Utc>>>;

    /// 仅在 key 不存在时写回时间戳，已有更新的值时保持不变，返回是否写入
    async fn restore_timestamp(&self, key: &AttributeKey, value: DateTime<Utc>) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_layout() {
        let key = AttributeKey::new(
            EntityType::BlogComment,
            12,
            keys::CUSTOMER_AWARDED_FOR_BLOG_COMMENT,
            3,
        );
        assert_eq!(
            key.storage_key(),
            "attr:blog_comment:12:CustomerAwardedForBlogComment:3"
        );
    }

    #[test]
    fn test_recipient_keys_are_distinct_per_customer() {
        let a = AttributeKey::date_award_recipient(1, 2, 100);
        let b = AttributeKey::date_award_recipient(1, 2, 101);
        let c = AttributeKey::date_award_recipient(1, 3, 100);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.storage_key().contains("CustomerAwardedOnDate:100"));
    }
}
