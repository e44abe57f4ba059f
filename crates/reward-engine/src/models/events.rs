//! 入站业务事件
//!
//! 每种事件对应宿主系统的一个领域事件，携带发放决策所需的实体引用与店铺 ID。

use serde::{Deserialize, Serialize};

use super::entities::LanguageId;

/// 博客评论审核通过
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogCommentApproved {
    pub comment_id: i64,
    pub customer_id: i64,
    pub blog_post_id: i64,
    pub store_id: i64,
}

/// 新闻评论审核通过
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsCommentApproved {
    pub comment_id: i64,
    pub customer_id: i64,
    pub news_item_id: i64,
    pub store_id: i64,
}

/// 商品评价审核通过
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReviewApproved {
    pub review_id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub store_id: i64,
}

/// 客户注册完成
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub customer_id: i64,
    pub store_id: i64,
}

/// 订阅邮件通讯，订阅记录只携带邮箱
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterSubscribed {
    pub subscription_id: i64,
    pub email: String,
    pub store_id: i64,
}

/// 订单已支付
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaid {
    pub order_id: i64,
    pub customer_id: i64,
    pub store_id: i64,
    /// 下单时客户使用的语言
    pub customer_language_id: LanguageId,
}

/// 购物车新增商品
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemInserted {
    pub cart_item_id: i64,
    pub customer_id: i64,
    pub store_id: i64,
}

/// 入站事件统一枚举，供按类型分发
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardEvent {
    BlogCommentApproved(BlogCommentApproved),
    NewsCommentApproved(NewsCommentApproved),
    ProductReviewApproved(ProductReviewApproved),
    CustomerRegistered(CustomerRegistered),
    NewsletterSubscribed(NewsletterSubscribed),
    OrderPaid(OrderPaid),
    CartItemInserted(CartItemInserted),
}

impl RewardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BlogCommentApproved(_) => "blog_comment_approved",
            Self::NewsCommentApproved(_) => "news_comment_approved",
            Self::ProductReviewApproved(_) => "product_review_approved",
            Self::CustomerRegistered(_) => "customer_registered",
            Self::NewsletterSubscribed(_) => "newsletter_subscribed",
            Self::OrderPaid(_) => "order_paid",
            Self::CartItemInserted(_) => "cart_item_inserted",
        }
    }

    pub fn store_id(&self) -> i64 {
        match self {
            Self::BlogCommentApproved(e) => e.store_id,
            Self::NewsCommentApproved(e) => e.store_id,
            Self::ProductReviewApproved(e) => e.store_id,
            Self::CustomerRegistered(e) => e.store_id,
            Self::NewsletterSubscribed(e) => e.store_id,
            Self::OrderPaid(e) => e.store_id,
            Self::CartItemInserted(e) => e.store_id,
        }
    }
}
