//! 事件奖励流程集成测试
//!
//! 使用内存协作方组装完整的评估器，覆盖幂等发放、激活时间、首次/快速购买等场景。

use chrono::{DateTime, Duration, TimeZone, Utc};
use reward_engine::attributes::{AttributeKey, AttributeStore, EntityType, MarkState, keys};
use reward_engine::models::{
    AwardPolicy, BlogCommentApproved, CartItemInserted, Customer, CustomerRegistered, DelayUnit,
    NewsCommentApproved, OrderPaid, PolicySet, RewardEvent, SkipReason, TriggerKind,
};
use reward_engine::testing::TestEnvironment;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn blog_env(points: i32, delay: i32) -> TestEnvironment {
    let env = TestEnvironment::new(t0()).with_policies(PolicySet::default().with(
        TriggerKind::BlogComment,
        AwardPolicy::enabled(points, "Earned promotion for the comment to blog post {0}")
            .with_activation_delay(delay, DelayUnit::Hours),
    ));
    env.customers.insert(Customer::new(7));
    env.catalog.add_blog_post(3, "Summer launch");
    env
}

fn blog_event(comment_id: i64) -> BlogCommentApproved {
    BlogCommentApproved {
        comment_id,
        customer_id: 7,
        blog_post_id: 3,
        store_id: 1,
    }
}

// ==================== 实体级触发 ====================

#[tokio::test]
async fn test_blog_comment_scenario_awards_once_and_sets_mark() {
    let env = blog_env(50, 0);
    let evaluator = env.evaluator();

    let outcome = evaluator
        .on_blog_comment_approved(&blog_event(11))
        .await
        .unwrap();

    let command = outcome.command().expect("应发放积分");
    assert_eq!(command.points, 50);
    assert_eq!(command.activation_time_utc, None);
    assert_eq!(
        command.message,
        "Earned promotion for the comment to blog post Summer launch"
    );
    assert_eq!(env.ledger.len(), 1);

    let mark = AttributeKey::new(
        EntityType::BlogComment,
        11,
        keys::CUSTOMER_AWARDED_FOR_BLOG_COMMENT,
        1,
    );
    assert_eq!(
        env.attributes.mark_state(&mark, t0()).await.unwrap(),
        Some(MarkState::Awarded)
    );
}

#[tokio::test]
async fn test_concurrent_duplicate_events_award_exactly_once() {
    let env = blog_env(50, 0);
    let evaluator = env.evaluator();

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let evaluator = evaluator.clone();
            tokio::spawn(async move {
                evaluator
                    .on_blog_comment_approved(&blog_event(42))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut awarded = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        if outcome.is_awarded() {
            awarded += 1;
        } else {
            assert_eq!(outcome.skip_reason(), Some(SkipReason::AlreadyAwarded));
        }
    }

    assert_eq!(awarded, 1);
    assert_eq!(env.ledger.len(), 1);
}

#[tokio::test]
async fn test_marks_are_scoped_per_store() {
    let env = blog_env(10, 0);
    let evaluator = env.evaluator();

    let mut other_store = blog_event(5);
    other_store.store_id = 2;

    assert!(
        evaluator
            .on_blog_comment_approved(&blog_event(5))
            .await
            .unwrap()
            .is_awarded()
    );
    assert!(
        evaluator
            .on_blog_comment_approved(&other_store)
            .await
            .unwrap()
            .is_awarded()
    );
    assert_eq!(env.ledger.len(), 2);
}

#[tokio::test]
async fn test_failed_emission_leaves_mark_unset_until_retry() {
    let env = blog_env(50, 0);
    let evaluator = env.evaluator();

    env.ledger.fail_next(1);
    assert!(
        evaluator
            .on_blog_comment_approved(&blog_event(8))
            .await
            .is_err()
    );
    assert!(env.ledger.is_empty());

    let retried = evaluator
        .on_blog_comment_approved(&blog_event(8))
        .await
        .unwrap();
    assert!(retried.is_awarded());
    assert_eq!(env.ledger.len(), 1);
}

#[tokio::test]
async fn test_missing_news_item_is_silent_skip() {
    let env = TestEnvironment::new(t0()).with_policies(
        PolicySet::default().with(TriggerKind::NewsComment, AwardPolicy::enabled(5, "News {0}")),
    );
    env.customers.insert(Customer::new(7));
    let evaluator = env.evaluator();

    let outcome = evaluator
        .on_news_comment_approved(&NewsCommentApproved {
            comment_id: 1,
            customer_id: 7,
            news_item_id: 404,
            store_id: 1,
        })
        .await
        .unwrap();
    assert_eq!(outcome.skip_reason(), Some(SkipReason::EntityNotFound));
    assert!(env.ledger.is_empty());
    assert!(env.attributes.is_empty());
}

// ==================== 激活时间 ====================

#[tokio::test]
async fn test_activation_time_follows_policy_delay() {
    let env = blog_env(20, 5);
    let evaluator = env.evaluator();

    let outcome = evaluator
        .on_blog_comment_approved(&blog_event(1))
        .await
        .unwrap();
    assert_eq!(
        outcome.command().unwrap().activation_time_utc,
        Some(t0() + Duration::hours(5))
    );

    env.policies.update(PolicySet::default().with(
        TriggerKind::Registration,
        AwardPolicy::enabled(10, "Welcome").with_activation_delay(2, DelayUnit::Days),
    ));
    let registered = evaluator
        .on_customer_registered(&CustomerRegistered {
            customer_id: 7,
            store_id: 1,
        })
        .await
        .unwrap();
    assert_eq!(
        registered.command().unwrap().activation_time_utc,
        Some(t0() + Duration::hours(48))
    );
}

#[tokio::test]
async fn test_out_of_range_delay_awards_with_latest_activation() {
    let env = blog_env(20, 0);
    env.policies.update(PolicySet::default().with(
        TriggerKind::BlogComment,
        AwardPolicy::enabled(20, "Blog {0}").with_activation_delay(i32::MAX, DelayUnit::Days),
    ));

    let outcome = env
        .evaluator()
        .on_blog_comment_approved(&blog_event(4))
        .await
        .unwrap();
    assert_eq!(
        outcome.command().unwrap().activation_time_utc,
        Some(DateTime::<Utc>::MAX_UTC)
    );
    assert_eq!(env.ledger.len(), 1);
}

#[tokio::test]
async fn test_policy_update_takes_effect_without_rebuild() {
    let env = blog_env(50, 0);
    let evaluator = env.evaluator();

    env.policies.update(PolicySet::default());
    let outcome = evaluator
        .on_blog_comment_approved(&blog_event(2))
        .await
        .unwrap();
    assert_eq!(outcome.skip_reason(), Some(SkipReason::PolicyDisabled));
}

// ==================== 首次购买 ====================

fn purchase_env(policies: PolicySet) -> TestEnvironment {
    let env = TestEnvironment::new(t0()).with_policies(policies);
    env.customers.insert(Customer::new(7));
    env
}

fn paid(order_id: i64) -> OrderPaid {
    OrderPaid {
        order_id,
        customer_id: 7,
        store_id: 1,
        customer_language_id: 1,
    }
}

#[tokio::test]
async fn test_first_purchase_exactness() {
    let env = purchase_env(PolicySet::default().with(
        TriggerKind::FirstPurchase,
        AwardPolicy::enabled(30, "Earned promotion for the first purchase"),
    ));
    let evaluator = env.evaluator();

    env.orders.record_paid_order(7);
    let first = evaluator.on_order_paid(&paid(100)).await.unwrap();
    assert!(first.first_purchase.is_awarded());

    env.orders.record_paid_order(7);
    let second = evaluator.on_order_paid(&paid(101)).await.unwrap();
    assert_eq!(
        second.first_purchase.skip_reason(),
        Some(SkipReason::NotFirstPurchase)
    );
    assert_eq!(env.ledger.len(), 1);
}

#[tokio::test]
async fn test_redelivered_first_order_event_awards_once() {
    let env = purchase_env(PolicySet::default().with(
        TriggerKind::FirstPurchase,
        AwardPolicy::enabled(30, "First"),
    ));
    let evaluator = env.evaluator();
    env.orders.set_paid_orders(7, 1);

    assert!(
        evaluator
            .on_order_paid(&paid(100))
            .await
            .unwrap()
            .first_purchase
            .is_awarded()
    );
    let redelivered = evaluator.on_order_paid(&paid(100)).await.unwrap();
    assert_eq!(
        redelivered.first_purchase.skip_reason(),
        Some(SkipReason::AlreadyAwarded)
    );
    assert_eq!(env.ledger.len(), 1);
}

// ==================== 快速购买 ====================

fn fast_env() -> TestEnvironment {
    purchase_env(PolicySet::default().with(
        TriggerKind::FastPurchase,
        AwardPolicy::enabled(20, "Earned promotion for the fast purchase")
            .with_fast_purchase_window(15),
    ))
}

async fn start_cart(env: &TestEnvironment) {
    env.carts.add_item(7, 1);
    let recorded = env
        .evaluator()
        .on_cart_item_inserted(&CartItemInserted {
            cart_item_id: 1,
            customer_id: 7,
            store_id: 1,
        })
        .await
        .unwrap();
    assert!(recorded);
}

#[tokio::test]
async fn test_fast_purchase_at_window_boundary_is_awarded() {
    let env = fast_env();
    start_cart(&env).await;

    env.clock.advance(Duration::minutes(15));
    let outcome = env.evaluator().on_order_paid(&paid(1)).await.unwrap();

    assert!(outcome.fast_purchase.is_awarded());
    assert_eq!(
        env.attributes
            .get_timestamp(&AttributeKey::purchase_start(7, 1))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_fast_purchase_one_second_late_is_not_awarded() {
    let env = fast_env();
    start_cart(&env).await;

    env.clock
        .advance(Duration::minutes(15) + Duration::seconds(1));
    let outcome = env.evaluator().on_order_paid(&paid(1)).await.unwrap();

    assert_eq!(
        outcome.fast_purchase.skip_reason(),
        Some(SkipReason::WindowExceeded)
    );
    assert!(env.ledger.is_empty());
    assert_eq!(
        env.attributes
            .get_timestamp(&AttributeKey::purchase_start(7, 1))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_fast_purchase_window_consumed_once_under_concurrency() {
    let env = fast_env();
    start_cart(&env).await;
    let evaluator = env.evaluator();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let evaluator = evaluator.clone();
            tokio::spawn(async move { evaluator.on_order_paid(&paid(i)).await.unwrap() })
        })
        .collect();

    let mut awarded = 0;
    for handle in handles {
        if handle.await.unwrap().fast_purchase.is_awarded() {
            awarded += 1;
        }
    }
    assert_eq!(awarded, 1);
}

#[tokio::test]
async fn test_second_cart_item_does_not_restart_window() {
    let env = fast_env();
    start_cart(&env).await;

    env.clock.advance(Duration::minutes(10));
    env.carts.add_item(7, 1);
    let recorded = env
        .evaluator()
        .on_cart_item_inserted(&CartItemInserted {
            cart_item_id: 2,
            customer_id: 7,
            store_id: 1,
        })
        .await
        .unwrap();
    assert!(!recorded);

    env.clock.advance(Duration::minutes(6));
    let outcome = env.evaluator().on_order_paid(&paid(1)).await.unwrap();
    assert_eq!(
        outcome.fast_purchase.skip_reason(),
        Some(SkipReason::WindowExceeded)
    );
}

#[tokio::test]
async fn test_first_and_fast_purchase_evaluated_independently() {
    let env = purchase_env(
        PolicySet::default()
            .with(TriggerKind::FirstPurchase, AwardPolicy::enabled(30, "First"))
            .with(
                TriggerKind::FastPurchase,
                AwardPolicy::enabled(20, "Fast").with_fast_purchase_window(15),
            ),
    );
    env.orders.set_paid_orders(7, 3);
    start_cart(&env).await;

    let outcome = env.evaluator().on_order_paid(&paid(9)).await.unwrap();
    assert_eq!(
        outcome.first_purchase.skip_reason(),
        Some(SkipReason::NotFirstPurchase)
    );
    assert!(outcome.fast_purchase.is_awarded());
}

// ==================== 统一分发 ====================

#[tokio::test]
async fn test_handle_deserialized_events() {
    let env = blog_env(50, 0);
    let evaluator = env.evaluator();

    let event: RewardEvent = serde_json::from_value(serde_json::json!({
        "type": "blog_comment_approved",
        "comment_id": 77,
        "customer_id": 7,
        "blog_post_id": 3,
        "store_id": 1
    }))
    .unwrap();

    let outcomes = evaluator.handle(&event).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].trigger, TriggerKind::BlogComment);
    assert!(outcomes[0].outcome.is_awarded());

    let cart: RewardEvent = serde_json::from_value(serde_json::json!({
        "type": "cart_item_inserted",
        "cart_item_id": 1,
        "customer_id": 7,
        "store_id": 1
    }))
    .unwrap();
    assert!(evaluator.handle(&cart).await.unwrap().is_empty());
}
