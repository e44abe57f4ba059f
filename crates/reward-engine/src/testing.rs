//! 测试工具模块
//!
//! 提供协作方的内存实现与一键组装的测试环境，供集成测试和宿主应用的本地调试使用。

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::attributes::MemoryAttributeStore;
use crate::date_rules::MemoryDateRuleRepository;
use crate::error::{Result, RewardError};
use crate::evaluator::RuleEvaluator;
use crate::localization::ResourceLocalizer;
use crate::models::{AwardCommand, ContentItem, Customer, LanguageId, PolicySet, Store};
use crate::ports::{
    CartLookup, Collaborators, ContentCatalog, CustomerDirectory, OrderLookup, RewardLedger,
    StoreDirectory,
};
use crate::scheduler::{ActivationScheduler, FixedClock};
use crate::settings::{DynamicPolicies, SweepSettings};
use crate::sweep::DateAwardSweep;
use crate::tracker::IdempotencyTracker;

/// 未设置语言时的默认语言
pub const DEFAULT_LANGUAGE: LanguageId = 1;

// ==================== 客户 ====================

#[derive(Debug, Default)]
pub struct InMemoryCustomers {
    customers: DashMap<i64, Customer>,
    languages: DashMap<(i64, i64), LanguageId>,
}

impl InMemoryCustomers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn set_language(&self, customer_id: i64, store_id: i64, language: LanguageId) {
        self.languages.insert((customer_id, store_id), language);
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomers {
    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<Customer>> {
        Ok(self.customers.get(&customer_id).map(|c| c.value().clone()))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        Ok(self
            .customers
            .iter()
            .find(|c| {
                c.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|c| c.value().clone()))
    }

    async fn find_customers_by_role(&self, role_id: Option<i64>) -> Result<Vec<Customer>> {
        let mut customers: Vec<Customer> = self
            .customers
            .iter()
            .filter(|c| role_id.is_none_or(|role| c.has_role(role)))
            .map(|c| c.value().clone())
            .collect();
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }

    async fn preferred_language(&self, customer_id: i64, store_id: i64) -> Result<LanguageId> {
        Ok(self
            .languages
            .get(&(customer_id, store_id))
            .map(|l| *l)
            .unwrap_or(DEFAULT_LANGUAGE))
    }
}

// ==================== 内容 ====================

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    blog_posts: DashMap<i64, ContentItem>,
    news_items: DashMap<i64, ContentItem>,
    products: DashMap<i64, ContentItem>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blog_post(&self, id: i64, title: &str) {
        self.blog_posts.insert(id, ContentItem::new(id, title));
    }

    pub fn add_news_item(&self, id: i64, title: &str) {
        self.news_items.insert(id, ContentItem::new(id, title));
    }

    pub fn add_product(&self, id: i64, name: &str) {
        self.products.insert(id, ContentItem::new(id, name));
    }
}

#[async_trait]
impl ContentCatalog for InMemoryCatalog {
    async fn find_blog_post(&self, blog_post_id: i64) -> Result<Option<ContentItem>> {
        Ok(self.blog_posts.get(&blog_post_id).map(|i| i.value().clone()))
    }

    async fn find_news_item(&self, news_item_id: i64) -> Result<Option<ContentItem>> {
        Ok(self.news_items.get(&news_item_id).map(|i| i.value().clone()))
    }

    async fn find_product(&self, product_id: i64) -> Result<Option<ContentItem>> {
        Ok(self.products.get(&product_id).map(|i| i.value().clone()))
    }
}

// ==================== 订单与购物车 ====================

#[derive(Debug, Default)]
pub struct InMemoryOrders {
    paid: DashMap<i64, u32>,
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paid_orders(&self, customer_id: i64, count: u32) {
        self.paid.insert(customer_id, count);
    }

    /// 记录一笔支付，返回支付后的订单数
    pub fn record_paid_order(&self, customer_id: i64) -> u32 {
        let mut count = self.paid.entry(customer_id).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait]
impl OrderLookup for InMemoryOrders {
    async fn count_paid_orders(&self, customer_id: i64) -> Result<u32> {
        Ok(self.paid.get(&customer_id).map(|c| *c).unwrap_or(0))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCarts {
    items: DashMap<(i64, i64), u32>,
}

impl InMemoryCarts {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加购一件商品，返回加购后的件数
    pub fn add_item(&self, customer_id: i64, store_id: i64) -> u32 {
        let mut count = self.items.entry((customer_id, store_id)).or_insert(0);
        *count += 1;
        *count
    }

    pub fn clear(&self, customer_id: i64, store_id: i64) {
        self.items.remove(&(customer_id, store_id));
    }
}

#[async_trait]
impl CartLookup for InMemoryCarts {
    async fn cart_item_count(&self, customer_id: i64, store_id: i64) -> Result<u32> {
        Ok(self
            .items
            .get(&(customer_id, store_id))
            .map(|c| *c)
            .unwrap_or(0))
    }
}

// ==================== 积分账本 ====================

/// 记录全部发放指令的账本，支持故障注入
#[derive(Debug, Default)]
pub struct RecordingLedger {
    awards: Mutex<Vec<AwardCommand>>,
    failing_customers: Mutex<HashSet<i64>>,
    fail_next: AtomicUsize,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn awards(&self) -> Vec<AwardCommand> {
        self.awards.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.awards.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.awards.lock().is_empty()
    }

    pub fn awards_for(&self, customer_id: i64) -> Vec<AwardCommand> {
        self.awards
            .lock()
            .iter()
            .filter(|a| a.customer_id == customer_id)
            .cloned()
            .collect()
    }

    /// 之后该客户的写入都失败，直到 `clear_failures`
    pub fn fail_for_customer(&self, customer_id: i64) {
        self.failing_customers.lock().insert(customer_id);
    }

    /// 接下来的 `n` 次写入失败
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.failing_customers.lock().clear();
        self.fail_next.store(0, Ordering::SeqCst);
    }

    fn should_fail(&self, customer_id: i64) -> bool {
        if self.failing_customers.lock().contains(&customer_id) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RewardLedger for RecordingLedger {
    async fn record_award(&self, command: &AwardCommand) -> Result<()> {
        if self.should_fail(command.customer_id) {
            return Err(RewardError::Ledger {
                customer_id: command.customer_id,
                message: "injected failure".to_string(),
            });
        }
        self.awards.lock().push(command.clone());
        Ok(())
    }
}

// ==================== 店铺 ====================

#[derive(Debug, Default)]
pub struct InMemoryStores {
    stores: Mutex<Vec<Store>>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: i64, name: &str) {
        self.stores.lock().push(Store {
            id,
            name: name.to_string(),
        });
    }
}

#[async_trait]
impl StoreDirectory for InMemoryStores {
    async fn all_stores(&self) -> Result<Vec<Store>> {
        Ok(self.stores.lock().clone())
    }
}

// ==================== 测试环境 ====================

/// 组装好的测试环境，所有协作方均为内存实现，时钟固定
pub struct TestEnvironment {
    pub customers: Arc<InMemoryCustomers>,
    pub catalog: Arc<InMemoryCatalog>,
    pub orders: Arc<InMemoryOrders>,
    pub carts: Arc<InMemoryCarts>,
    pub ledger: Arc<RecordingLedger>,
    pub stores: Arc<InMemoryStores>,
    pub localizer: Arc<ResourceLocalizer>,
    pub attributes: Arc<MemoryAttributeStore>,
    pub rules: Arc<MemoryDateRuleRepository>,
    pub clock: Arc<FixedClock>,
    pub policies: DynamicPolicies,
    pub sweep_settings: SweepSettings,
    pub claim_ttl: Duration,
}

impl TestEnvironment {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            customers: Arc::new(InMemoryCustomers::new()),
            catalog: Arc::new(InMemoryCatalog::new()),
            orders: Arc::new(InMemoryOrders::new()),
            carts: Arc::new(InMemoryCarts::new()),
            ledger: Arc::new(RecordingLedger::new()),
            stores: Arc::new(InMemoryStores::new()),
            localizer: Arc::new(ResourceLocalizer::new()),
            attributes: Arc::new(MemoryAttributeStore::new()),
            rules: Arc::new(MemoryDateRuleRepository::new()),
            clock: Arc::new(FixedClock::new(now)),
            policies: DynamicPolicies::default(),
            sweep_settings: SweepSettings::default(),
            claim_ttl: Duration::seconds(300),
        }
    }

    pub fn with_policies(self, policies: PolicySet) -> Self {
        self.policies.update(policies);
        self
    }

    pub fn with_sweep_settings(mut self, settings: SweepSettings) -> Self {
        self.sweep_settings = settings;
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            customers: self.customers.clone(),
            catalog: self.catalog.clone(),
            orders: self.orders.clone(),
            carts: self.carts.clone(),
            ledger: self.ledger.clone(),
            localizer: self.localizer.clone(),
            stores: self.stores.clone(),
        }
    }

    pub fn tracker(&self) -> IdempotencyTracker {
        IdempotencyTracker::new(self.attributes.clone(), self.clock.clone(), self.claim_ttl)
    }

    pub fn evaluator(&self) -> RuleEvaluator {
        RuleEvaluator::new(
            self.collaborators(),
            self.policies.clone(),
            self.tracker(),
            ActivationScheduler::new(self.clock.clone()),
        )
    }

    pub fn sweep(&self) -> DateAwardSweep {
        DateAwardSweep::new(
            self.collaborators(),
            self.rules.clone(),
            self.tracker(),
            self.clock.clone(),
            self.sweep_settings.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_ledger_fault_injection() {
        let ledger = RecordingLedger::new();
        let command = AwardCommand {
            customer_id: 1,
            store_id: 1,
            points: 5,
            message: "m".to_string(),
            activation_time_utc: None,
        };

        ledger.fail_next(1);
        assert!(ledger.record_award(&command).await.is_err());
        assert!(ledger.record_award(&command).await.is_ok());

        ledger.fail_for_customer(1);
        assert!(ledger.record_award(&command).await.is_err());
        ledger.clear_failures();
        assert!(ledger.record_award(&command).await.is_ok());
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_customers_by_role() {
        let customers = InMemoryCustomers::new();
        customers.insert(Customer::new(2).with_roles([5]));
        customers.insert(Customer::new(1).with_roles([3, 5]));
        customers.insert(Customer::new(3).with_roles([3]));

        let role5: Vec<i64> = customers
            .find_customers_by_role(Some(5))
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(role5, vec![1, 2]);
        assert_eq!(customers.find_customers_by_role(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cart_and_order_counters() {
        let carts = InMemoryCarts::new();
        assert_eq!(carts.add_item(1, 1), 1);
        assert_eq!(carts.add_item(1, 1), 2);
        assert_eq!(carts.cart_item_count(1, 2).await.unwrap(), 0);

        let orders = InMemoryOrders::new();
        assert_eq!(orders.record_paid_order(4), 1);
        assert_eq!(orders.count_paid_orders(4).await.unwrap(), 1);
    }
}
