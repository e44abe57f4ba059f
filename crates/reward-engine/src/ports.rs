//! 外部协作方接口
//!
//! 引擎只依赖这些抽象，由宿主应用注入具体实现，测试中使用 mock 或内存实现。

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::localization::Localizer;
use crate::models::{AwardCommand, ContentItem, Customer, LanguageId, Store};

/// 客户目录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<Customer>>;

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>>;

    /// `None` 返回全部客户
    async fn find_customers_by_role(&self, role_id: Option<i64>) -> Result<Vec<Customer>>;

    /// 客户在指定店铺下的首选语言
    async fn preferred_language(&self, customer_id: i64, store_id: i64) -> Result<LanguageId>;
}

/// 内容目录（博客、新闻、商品）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn find_blog_post(&self, blog_post_id: i64) -> Result<Option<ContentItem>>;
    async fn find_news_item(&self, news_item_id: i64) -> Result<Option<ContentItem>>;
    async fn find_product(&self, product_id: i64) -> Result<Option<ContentItem>>;
}

/// 订单查询
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// 客户已支付订单数（含当前订单）
    async fn count_paid_orders(&self, customer_id: i64) -> Result<u32>;
}

/// 购物车查询
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartLookup: Send + Sync {
    async fn cart_item_count(&self, customer_id: i64, store_id: i64) -> Result<u32>;
}

/// 积分账本（发放指令的接收方）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardLedger: Send + Sync {
    async fn record_award(&self, command: &AwardCommand) -> Result<()>;
}

/// 店铺目录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreDirectory: Send + Sync {
    async fn all_stores(&self) -> Result<Vec<Store>>;
}

/// 评估器与清扫任务共用的协作方集合
#[derive(Clone)]
pub struct Collaborators {
    pub customers: Arc<dyn CustomerDirectory>,
    pub catalog: Arc<dyn ContentCatalog>,
    pub orders: Arc<dyn OrderLookup>,
    pub carts: Arc<dyn CartLookup>,
    pub ledger: Arc<dyn RewardLedger>,
    pub localizer: Arc<dyn Localizer>,
    pub stores: Arc<dyn StoreDirectory>,
}
