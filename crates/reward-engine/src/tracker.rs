//! 幂等标记跟踪
//!
//! 在属性存储之上实现 抢占 → 发放 → 提交 协议：
//!
//! 1. `claim` 原子抢占标记，失败说明已发放或另一处理方正在发放
//! 2. 调用方写入积分账本
//! 3. 成功则 `commit`，失败则 `release` 让后续重试可以再次抢占
//!
//! 进程在 2 与 3 之间崩溃时，抢占在 TTL 到期后自动失效。

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::attributes::{AttributeKey, AttributeStore, MarkState};
use crate::error::Result;
use crate::scheduler::Clock;

/// 默认抢占有效期
pub const DEFAULT_CLAIM_TTL_SECONDS: i64 = 300;

/// 已成功抢占的标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkClaim {
    key: AttributeKey,
    claim_id: String,
}

impl MarkClaim {
    pub fn key(&self) -> &AttributeKey {
        &self.key
    }

    pub fn claim_id(&self) -> &str {
        &self.claim_id
    }
}

/// 幂等标记跟踪器
#[derive(Clone)]
pub struct IdempotencyTracker {
    store: Arc<dyn AttributeStore>,
    clock: Arc<dyn Clock>,
    claim_ttl: Duration,
}

impl IdempotencyTracker {
    pub fn new(store: Arc<dyn AttributeStore>, clock: Arc<dyn Clock>, claim_ttl: Duration) -> Self {
        Self {
            store,
            clock,
            claim_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn AttributeStore> {
        &self.store
    }

    /// 标记是否已提交
    ///
    /// 抢占中的标记不算已发放；是否可发放以 `claim` 结果为准。
    pub async fn is_awarded(&self, key: &AttributeKey) -> Result<bool> {
        let state = self.store.mark_state(key, self.clock.now()).await?;
        Ok(matches!(state, Some(MarkState::Awarded)))
    }

    /// 尝试抢占标记
    pub async fn claim(&self, key: &AttributeKey) -> Result<Option<MarkClaim>> {
        let now = self.clock.now();
        let claim_id = Uuid::new_v4().to_string();
        if self
            .store
            .try_claim(key, &claim_id, now, now + self.claim_ttl)
            .await?
        {
            debug!(key = %key, claim_id = %claim_id, "标记抢占成功");
            Ok(Some(MarkClaim {
                key: key.clone(),
                claim_id,
            }))
        } else {
            debug!(key = %key, "标记已被占用");
            Ok(None)
        }
    }

    /// 发放成功后提交标记
    ///
    /// 提交返回 false 表示抢占已过期并被其他处理方接管，此时积分已写入，只记录告警。
    pub async fn commit(&self, claim: MarkClaim) -> Result<()> {
        let committed = self
            .store
            .commit_claim(&claim.key, &claim.claim_id)
            .await
            .inspect_err(|e| {
                error!(key = %claim.key, error = %e, "积分已发放但标记提交失败");
            })?;
        if !committed {
            warn!(key = %claim.key, claim_id = %claim.claim_id, "标记抢占已失效，提交被忽略");
        }
        Ok(())
    }

    /// 发放失败后释放标记
    ///
    /// 释放失败只记录日志，抢占会在 TTL 到期后自动失效。
    pub async fn release(&self, claim: MarkClaim) {
        match self.store.release_claim(&claim.key, &claim.claim_id).await {
            Ok(true) => debug!(key = %claim.key, "标记已释放"),
            Ok(false) => warn!(key = %claim.key, "标记释放时已不再持有"),
            Err(e) => warn!(key = %claim.key, error = %e, "标记释放失败，等待 TTL 过期"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{EntityType, MemoryAttributeStore, MockAttributeStore, keys};
    use crate::error::RewardError;
    use crate::scheduler::FixedClock;
    use chrono::Utc;

    fn key() -> AttributeKey {
        AttributeKey::new(
            EntityType::NewsComment,
            5,
            keys::CUSTOMER_AWARDED_FOR_NEWS_COMMENT,
            1,
        )
    }

    fn tracker_with_clock() -> (IdempotencyTracker, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let tracker = IdempotencyTracker::new(
            Arc::new(MemoryAttributeStore::new()),
            clock.clone(),
            Duration::seconds(60),
        );
        (tracker, clock)
    }

    #[tokio::test]
    async fn test_claim_then_commit_marks_awarded() {
        let (tracker, _) = tracker_with_clock();

        let claim = tracker.claim(&key()).await.unwrap().unwrap();
        assert!(!tracker.is_awarded(&key()).await.unwrap());
        assert!(tracker.claim(&key()).await.unwrap().is_none());

        tracker.commit(claim).await.unwrap();
        assert!(tracker.is_awarded(&key()).await.unwrap());
        assert!(tracker.claim(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_leaves_mark_unset() {
        let (tracker, _) = tracker_with_clock();

        let claim = tracker.claim(&key()).await.unwrap().unwrap();
        tracker.release(claim).await;

        assert!(!tracker.is_awarded(&key()).await.unwrap());
        assert!(tracker.claim(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_claim_expires_after_ttl() {
        let (tracker, clock) = tracker_with_clock();

        let _abandoned = tracker.claim(&key()).await.unwrap().unwrap();
        clock.advance(Duration::seconds(30));
        assert!(tracker.claim(&key()).await.unwrap().is_none());

        clock.advance(Duration::seconds(31));
        assert!(tracker.claim(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_propagates_store_error() {
        let mut store = MockAttributeStore::new();
        store.expect_try_claim().returning(|_, _, _, _| Ok(true));
        store
            .expect_commit_claim()
            .returning(|_, _| Err(RewardError::AttributeStore("down".to_string())));

        let tracker = IdempotencyTracker::new(
            Arc::new(store),
            Arc::new(FixedClock::new(Utc::now())),
            Duration::seconds(60),
        );
        let claim = tracker.claim(&key()).await.unwrap().unwrap();
        assert!(tracker.commit(claim).await.is_err());
    }

    #[tokio::test]
    async fn test_release_swallows_store_error() {
        let mut store = MockAttributeStore::new();
        store.expect_try_claim().returning(|_, _, _, _| Ok(true));
        store
            .expect_release_claim()
            .times(1)
            .returning(|_, _| Err(RewardError::AttributeStore("down".to_string())));

        let tracker = IdempotencyTracker::new(
            Arc::new(store),
            Arc::new(FixedClock::new(Utc::now())),
            Duration::seconds(60),
        );
        let claim = tracker.claim(&key()).await.unwrap().unwrap();
        tracker.release(claim).await;
    }
}
