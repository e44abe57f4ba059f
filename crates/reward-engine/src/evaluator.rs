//! 规则评估器
//!
//! 每种业务事件对应一个处理方法，共用同一套判定流程（按顺序短路）：
//!
//! 1. 策略已启用
//! 2. 事件中的客户存在
//! 3. 实体级触发（博客/新闻评论、商品评价、订阅）尚未发放过
//! 4. 关联的博文 / 新闻 / 商品存在
//!
//! 全部满足后计算激活时间、按客户语言本地化消息并写入积分账本。
//! 实体级触发使用 抢占 → 发放 → 提交 协议保证同一实体至多发放一次。
//!
//! 任一前置条件不满足时返回 `AwardOutcome::Skipped`，不产生任何副作用；
//! 只有外部协作方故障才以错误返回。

use chrono::Utc;
use reward_shared::observability::metrics as reward_metrics;
use tracing::{debug, error, info, instrument, warn};

use crate::attributes::{AttributeKey, EntityType, keys};
use crate::error::Result;
use crate::localization::format_message;
use crate::models::{
    AwardCommand, AwardOutcome, AwardPolicy, BlogCommentApproved, CartItemInserted, ContentItem,
    Customer, CustomerRegistered, LanguageId, NewsCommentApproved, NewsletterSubscribed, OrderPaid,
    ProductReviewApproved, RewardEvent, SkipReason, TriggerKind, TriggerOutcome,
};
use crate::ports::Collaborators;
use crate::scheduler::ActivationScheduler;
use crate::settings::DynamicPolicies;
use crate::tracker::{IdempotencyTracker, MarkClaim};

/// 前置条件判定结果，`Err` 为跳过原因
type Eligibility<T> = std::result::Result<T, SkipReason>;

/// 事件中的客户引用
#[derive(Debug, Clone)]
enum CustomerRef {
    Id(i64),
    /// 订阅事件只携带邮箱
    Email(String),
}

/// 消息模板 `{0}` 对应的关联内容
#[derive(Debug, Clone, Copy)]
enum Subject {
    BlogPost(i64),
    NewsItem(i64),
    Product(i64),
}

impl Subject {
    /// 商品名称按客户语言本地化，博文与新闻标题原样使用
    fn localized_title(&self) -> bool {
        matches!(self, Self::Product(_))
    }
}

/// 实体级触发的评估请求
struct EntityTrigger {
    trigger: TriggerKind,
    customer: CustomerRef,
    store_id: i64,
    mark: AttributeKey,
    subject: Option<Subject>,
}

/// 已支付订单的评估结果，首次购买与快速购买相互独立
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPaidOutcome {
    pub first_purchase: AwardOutcome,
    pub fast_purchase: AwardOutcome,
}

/// 规则评估器
#[derive(Clone)]
pub struct RuleEvaluator {
    deps: Collaborators,
    policies: DynamicPolicies,
    tracker: IdempotencyTracker,
    scheduler: ActivationScheduler,
}

impl RuleEvaluator {
    pub fn new(
        deps: Collaborators,
        policies: DynamicPolicies,
        tracker: IdempotencyTracker,
        scheduler: ActivationScheduler,
    ) -> Self {
        Self {
            deps,
            policies,
            tracker,
            scheduler,
        }
    }

    pub fn policies(&self) -> &DynamicPolicies {
        &self.policies
    }

    // ==================== 事件处理 ====================

    #[instrument(skip(self, event), fields(comment_id = event.comment_id, customer_id = event.customer_id, store_id = event.store_id))]
    pub async fn on_blog_comment_approved(
        &self,
        event: &BlogCommentApproved,
    ) -> Result<AwardOutcome> {
        self.evaluate_entity_trigger(EntityTrigger {
            trigger: TriggerKind::BlogComment,
            customer: CustomerRef::Id(event.customer_id),
            store_id: event.store_id,
            mark: AttributeKey::new(
                EntityType::BlogComment,
                event.comment_id,
                keys::CUSTOMER_AWARDED_FOR_BLOG_COMMENT,
                event.store_id,
            ),
            subject: Some(Subject::BlogPost(event.blog_post_id)),
        })
        .await
    }

    #[instrument(skip(self, event), fields(comment_id = event.comment_id, customer_id = event.customer_id, store_id = event.store_id))]
    pub async fn on_news_comment_approved(
        &self,
        event: &NewsCommentApproved,
    ) -> Result<AwardOutcome> {
        self.evaluate_entity_trigger(EntityTrigger {
            trigger: TriggerKind::NewsComment,
            customer: CustomerRef::Id(event.customer_id),
            store_id: event.store_id,
            mark: AttributeKey::new(
                EntityType::NewsComment,
                event.comment_id,
                keys::CUSTOMER_AWARDED_FOR_NEWS_COMMENT,
                event.store_id,
            ),
            subject: Some(Subject::NewsItem(event.news_item_id)),
        })
        .await
    }

    #[instrument(skip(self, event), fields(review_id = event.review_id, customer_id = event.customer_id, store_id = event.store_id))]
    pub async fn on_product_review_approved(
        &self,
        event: &ProductReviewApproved,
    ) -> Result<AwardOutcome> {
        self.evaluate_entity_trigger(EntityTrigger {
            trigger: TriggerKind::ProductReview,
            customer: CustomerRef::Id(event.customer_id),
            store_id: event.store_id,
            mark: AttributeKey::new(
                EntityType::ProductReview,
                event.review_id,
                keys::CUSTOMER_AWARDED_FOR_PRODUCT_REVIEW,
                event.store_id,
            ),
            subject: Some(Subject::Product(event.product_id)),
        })
        .await
    }

    #[instrument(skip(self, event), fields(subscription_id = event.subscription_id, store_id = event.store_id))]
    pub async fn on_newsletter_subscribed(
        &self,
        event: &NewsletterSubscribed,
    ) -> Result<AwardOutcome> {
        self.evaluate_entity_trigger(EntityTrigger {
            trigger: TriggerKind::NewsletterSubscription,
            customer: CustomerRef::Email(event.email.clone()),
            store_id: event.store_id,
            mark: AttributeKey::new(
                EntityType::NewsletterSubscription,
                event.subscription_id,
                keys::CUSTOMER_AWARDED_FOR_SUBSCRIPTION,
                event.store_id,
            ),
            subject: None,
        })
        .await
    }

    /// 注册奖励
    ///
    /// 注册在上游只发生一次，不使用幂等标记。
    #[instrument(skip(self, event), fields(customer_id = event.customer_id, store_id = event.store_id))]
    pub async fn on_customer_registered(&self, event: &CustomerRegistered) -> Result<AwardOutcome> {
        let trigger = TriggerKind::Registration;
        let policy = self.policy(trigger);
        if !policy.enabled {
            return Ok(self.skip(trigger, SkipReason::PolicyDisabled));
        }
        let customer = match self.resolve_customer(&CustomerRef::Id(event.customer_id)).await? {
            Ok(customer) => customer,
            Err(reason) => return Ok(self.skip(trigger, reason)),
        };

        let language = self
            .deps
            .customers
            .preferred_language(customer.id, event.store_id)
            .await?;
        let message = self.compose_message(&policy, language, None).await?;
        let command = self
            .emit(trigger, customer.id, event.store_id, &policy, message)
            .await?;
        Ok(AwardOutcome::Awarded(command))
    }

    /// 购物车加购：购物车从空变为一件商品时记录购物开始时间
    ///
    /// 返回是否记录了开始时间。新的开始时间覆盖旧值。
    #[instrument(skip(self, event), fields(customer_id = event.customer_id, store_id = event.store_id))]
    pub async fn on_cart_item_inserted(&self, event: &CartItemInserted) -> Result<bool> {
        if !self.policy(TriggerKind::FastPurchase).enabled || event.customer_id < 1 {
            return Ok(false);
        }

        let count = self
            .deps
            .carts
            .cart_item_count(event.customer_id, event.store_id)
            .await?;
        if count > 1 {
            debug!(count, "购物车已有商品，不记录开始时间");
            return Ok(false);
        }

        let now = self.scheduler.now();
        self.tracker
            .store()
            .set_timestamp(
                &AttributeKey::purchase_start(event.customer_id, event.store_id),
                now,
            )
            .await?;
        debug!(started_at = %now, "已记录购物开始时间");
        Ok(true)
    }

    /// 订单支付：分别评估首次购买与快速购买
    #[instrument(skip(self, event), fields(order_id = event.order_id, customer_id = event.customer_id, store_id = event.store_id))]
    pub async fn on_order_paid(&self, event: &OrderPaid) -> Result<OrderPaidOutcome> {
        let first_purchase = self.evaluate_first_purchase(event).await?;
        let fast_purchase = self.evaluate_fast_purchase(event).await?;
        Ok(OrderPaidOutcome {
            first_purchase,
            fast_purchase,
        })
    }

    /// 统一事件分发
    ///
    /// 加购事件只记录购物开始时间，不产生评估结果。
    pub async fn handle(&self, event: &RewardEvent) -> Result<Vec<TriggerOutcome>> {
        let outcomes = match event {
            RewardEvent::BlogCommentApproved(e) => vec![TriggerOutcome::new(
                TriggerKind::BlogComment,
                self.on_blog_comment_approved(e).await?,
            )],
            RewardEvent::NewsCommentApproved(e) => vec![TriggerOutcome::new(
                TriggerKind::NewsComment,
                self.on_news_comment_approved(e).await?,
            )],
            RewardEvent::ProductReviewApproved(e) => vec![TriggerOutcome::new(
                TriggerKind::ProductReview,
                self.on_product_review_approved(e).await?,
            )],
            RewardEvent::CustomerRegistered(e) => vec![TriggerOutcome::new(
                TriggerKind::Registration,
                self.on_customer_registered(e).await?,
            )],
            RewardEvent::NewsletterSubscribed(e) => vec![TriggerOutcome::new(
                TriggerKind::NewsletterSubscription,
                self.on_newsletter_subscribed(e).await?,
            )],
            RewardEvent::OrderPaid(e) => {
                let outcome = self.on_order_paid(e).await?;
                vec![
                    TriggerOutcome::new(TriggerKind::FirstPurchase, outcome.first_purchase),
                    TriggerOutcome::new(TriggerKind::FastPurchase, outcome.fast_purchase),
                ]
            }
            RewardEvent::CartItemInserted(e) => {
                self.on_cart_item_inserted(e).await?;
                Vec::new()
            }
        };
        Ok(outcomes)
    }

    // ==================== 评估流程 ====================

    async fn evaluate_entity_trigger(&self, request: EntityTrigger) -> Result<AwardOutcome> {
        let trigger = request.trigger;
        let policy = self.policy(trigger);

        // 1. 策略开关
        if !policy.enabled {
            return Ok(self.skip(trigger, SkipReason::PolicyDisabled));
        }

        // 2. 客户
        let customer = match self.resolve_customer(&request.customer).await? {
            Ok(customer) => customer,
            Err(reason) => return Ok(self.skip(trigger, reason)),
        };

        // 3. 幂等标记
        if self.tracker.is_awarded(&request.mark).await? {
            return Ok(self.skip(trigger, SkipReason::AlreadyAwarded));
        }

        // 4. 关联内容
        let subject = match request.subject {
            Some(subject) => match self.find_subject(subject).await? {
                Some(item) => Some((subject, item)),
                None => return Ok(self.skip(trigger, SkipReason::EntityNotFound)),
            },
            None => None,
        };

        let language = self
            .deps
            .customers
            .preferred_language(customer.id, request.store_id)
            .await?;
        let message = self.compose_message(&policy, language, subject).await?;

        // 抢占失败说明并发的重复事件已在处理或已发放
        let Some(claim) = self.tracker.claim(&request.mark).await? else {
            return Ok(self.skip(trigger, SkipReason::AlreadyAwarded));
        };
        self.emit_claimed(claim, trigger, customer.id, request.store_id, &policy, message)
            .await
    }

    async fn evaluate_first_purchase(&self, event: &OrderPaid) -> Result<AwardOutcome> {
        let trigger = TriggerKind::FirstPurchase;
        let policy = self.policy(trigger);
        if !policy.enabled {
            return Ok(self.skip(trigger, SkipReason::PolicyDisabled));
        }
        let customer = match self.resolve_customer(&CustomerRef::Id(event.customer_id)).await? {
            Ok(customer) => customer,
            Err(reason) => return Ok(self.skip(trigger, reason)),
        };

        let paid_orders = self.deps.orders.count_paid_orders(customer.id).await?;
        if paid_orders != 1 {
            debug!(paid_orders, "不是首个已支付订单");
            return Ok(self.skip(trigger, SkipReason::NotFirstPurchase));
        }

        // 订单级标记防止重复投递的支付事件重复发放
        let mark = AttributeKey::new(
            EntityType::Order,
            event.order_id,
            keys::CUSTOMER_AWARDED_FOR_FIRST_PURCHASE,
            event.store_id,
        );
        if self.tracker.is_awarded(&mark).await? {
            return Ok(self.skip(trigger, SkipReason::AlreadyAwarded));
        }

        let message = self
            .compose_message(&policy, event.customer_language_id, None)
            .await?;
        let Some(claim) = self.tracker.claim(&mark).await? else {
            return Ok(self.skip(trigger, SkipReason::AlreadyAwarded));
        };
        self.emit_claimed(claim, trigger, customer.id, event.store_id, &policy, message)
            .await
    }

    async fn evaluate_fast_purchase(&self, event: &OrderPaid) -> Result<AwardOutcome> {
        let trigger = TriggerKind::FastPurchase;
        let policy = self.policy(trigger);
        if !policy.enabled {
            return Ok(self.skip(trigger, SkipReason::PolicyDisabled));
        }
        let customer = match self.resolve_customer(&CustomerRef::Id(event.customer_id)).await? {
            Ok(customer) => customer,
            Err(reason) => return Ok(self.skip(trigger, reason)),
        };

        // 读取即清除，无论是否在窗口内，开始时间都只能消费一次
        let start_key = AttributeKey::purchase_start(customer.id, event.store_id);
        let Some(started_at) = self.tracker.store().take_timestamp(&start_key).await? else {
            return Ok(self.skip(trigger, SkipReason::NoPurchaseStart));
        };

        let now = self.scheduler.now();
        if !within_window(started_at, now, policy.fast_purchase_window()) {
            debug!(
                elapsed_seconds = (now - started_at).num_seconds(),
                window_minutes = ?policy.fast_purchase_window_minutes,
                "超出快速购买窗口"
            );
            return Ok(self.skip(trigger, SkipReason::WindowExceeded));
        }

        let emitted = match self
            .compose_message(&policy, event.customer_language_id, None)
            .await
        {
            Ok(message) => {
                self.emit(trigger, customer.id, event.store_id, &policy, message)
                    .await
            }
            Err(e) => Err(e),
        };

        match emitted {
            Ok(command) => Ok(AwardOutcome::Awarded(command)),
            Err(e) => {
                // 发放失败时恢复开始时间，重试仍可在窗口内发放；期间已记录的新开始时间优先
                match self
                    .tracker
                    .store()
                    .restore_timestamp(&start_key, started_at)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => debug!("已有更新的购物开始时间，不再恢复"),
                    Err(restore_err) => warn!(error = %restore_err, "购物开始时间恢复失败"),
                }
                Err(e)
            }
        }
    }

    // ==================== 内部辅助 ====================

    fn policy(&self, trigger: TriggerKind) -> AwardPolicy {
        self.policies.load().get(trigger).clone()
    }

    fn skip(&self, trigger: TriggerKind, reason: SkipReason) -> AwardOutcome {
        debug!(trigger = %trigger, reason = %reason, "未发放积分");
        reward_metrics::record_skip(trigger.as_str(), reason.as_str());
        AwardOutcome::Skipped(reason)
    }

    async fn resolve_customer(&self, customer: &CustomerRef) -> Result<Eligibility<Customer>> {
        let found = match customer {
            CustomerRef::Id(id) if *id < 1 => return Ok(Err(SkipReason::AnonymousCustomer)),
            CustomerRef::Id(id) => self.deps.customers.find_customer_by_id(*id).await?,
            CustomerRef::Email(email) if email.trim().is_empty() => {
                return Ok(Err(SkipReason::AnonymousCustomer));
            }
            CustomerRef::Email(email) => self.deps.customers.find_customer_by_email(email).await?,
        };
        Ok(found.ok_or(SkipReason::CustomerNotFound))
    }

    async fn find_subject(&self, subject: Subject) -> Result<Option<ContentItem>> {
        match subject {
            Subject::BlogPost(id) => self.deps.catalog.find_blog_post(id).await,
            Subject::NewsItem(id) => self.deps.catalog.find_news_item(id).await,
            Subject::Product(id) => self.deps.catalog.find_product(id).await,
        }
    }

    async fn compose_message(
        &self,
        policy: &AwardPolicy,
        language: LanguageId,
        subject: Option<(Subject, ContentItem)>,
    ) -> Result<String> {
        let template = self
            .deps
            .localizer
            .localize(&policy.message_template, language)
            .await?;
        let Some((subject, item)) = subject else {
            return Ok(template);
        };
        let title = if subject.localized_title() {
            self.deps.localizer.localize(&item.title, language).await?
        } else {
            item.title
        };
        Ok(format_message(&template, &title))
    }

    async fn emit(
        &self,
        trigger: TriggerKind,
        customer_id: i64,
        store_id: i64,
        policy: &AwardPolicy,
        message: String,
    ) -> Result<AwardCommand> {
        let command = AwardCommand {
            customer_id,
            store_id,
            points: policy.points,
            message,
            activation_time_utc: self.scheduler.for_policy(policy),
        };

        match self.deps.ledger.record_award(&command).await {
            Ok(()) => {
                info!(
                    trigger = %trigger,
                    customer_id,
                    store_id,
                    points = command.points,
                    activation_time = ?command.activation_time_utc,
                    "积分已发放"
                );
                reward_metrics::record_award(trigger.as_str(), "success");
                Ok(command)
            }
            Err(e) => {
                error!(trigger = %trigger, customer_id, store_id, error = %e, "积分发放失败");
                reward_metrics::record_award(trigger.as_str(), "failed");
                Err(e)
            }
        }
    }

    async fn emit_claimed(
        &self,
        claim: MarkClaim,
        trigger: TriggerKind,
        customer_id: i64,
        store_id: i64,
        policy: &AwardPolicy,
        message: String,
    ) -> Result<AwardOutcome> {
        match self
            .emit(trigger, customer_id, store_id, policy, message)
            .await
        {
            Ok(command) => {
                self.tracker.commit(claim).await?;
                Ok(AwardOutcome::Awarded(command))
            }
            Err(e) => {
                self.tracker.release(claim).await;
                Err(e)
            }
        }
    }
}

/// 当前 UTC 时间与开始时间的差值是否在窗口内（含边界）
pub fn within_window(
    started_at: chrono::DateTime<Utc>,
    now: chrono::DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    now - started_at <= window
}
