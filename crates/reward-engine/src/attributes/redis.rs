//! Redis 属性存储
//!
//! 标记值编码：
//! - `claim:<claim_id>`：抢占中，带 PX 过期时间，过期后由 Redis 自动删除
//! - `awarded`：已发放，永久保存
//!
//! 时间戳以 RFC3339 字符串保存。

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reward_shared::error::SharedError;
use reward_shared::redis_store::RedisStore;
use tracing::instrument;

use super::{AttributeKey, AttributeStore, MarkState};
use crate::error::Result;

const AWARDED: &str = "awarded";
const CLAIM_PREFIX: &str = "claim:";

/// 基于 Redis 的属性存储
#[derive(Clone)]
pub struct RedisAttributeStore {
    redis: RedisStore,
}

impl RedisAttributeStore {
    pub fn new(redis: RedisStore) -> Self {
        Self { redis }
    }

    fn redis_key(&self, key: &AttributeKey) -> String {
        self.redis.key(&key.storage_key())
    }

    fn claim_value(claim_id: &str) -> String {
        format!("{CLAIM_PREFIX}{claim_id}")
    }

    fn parse_mark(key: &str, raw: &str) -> Result<MarkState> {
        if raw == AWARDED {
            return Ok(MarkState::Awarded);
        }
        match raw.strip_prefix(CLAIM_PREFIX) {
            Some(claim_id) => Ok(MarkState::Claimed {
                claim_id: claim_id.to_string(),
            }),
            None => Err(SharedError::CorruptValue {
                key: key.to_string(),
                message: format!("无法识别的标记值: {raw}"),
            }
            .into()),
        }
    }

    fn parse_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                SharedError::CorruptValue {
                    key: key.to_string(),
                    message: e.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl AttributeStore for RedisAttributeStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn mark_state(
        &self,
        key: &AttributeKey,
        _now: DateTime<Utc>,
    ) -> Result<Option<MarkState>> {
        let redis_key = self.redis_key(key);
        match self.redis.get(&redis_key).await? {
            Some(raw) => Self::parse_mark(&redis_key, &raw).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn try_claim(
        &self,
        key: &AttributeKey,
        claim_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let ttl = (expires_at - now)
            .to_std()
            .unwrap_or(StdDuration::from_millis(1));
        let claimed = self
            .redis
            .set_nx_px(&self.redis_key(key), &Self::claim_value(claim_id), ttl)
            .await?;
        Ok(claimed)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn commit_claim(&self, key: &AttributeKey, claim_id: &str) -> Result<bool> {
        let committed = self
            .redis
            .compare_and_set(&self.redis_key(key), &Self::claim_value(claim_id), AWARDED)
            .await?;
        Ok(committed)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn release_claim(&self, key: &AttributeKey, claim_id: &str) -> Result<bool> {
        let released = self
            .redis
            .compare_and_delete(&self.redis_key(key), &Self::claim_value(claim_id))
            .await?;
        Ok(released)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn set_timestamp(&self, key: &AttributeKey, value: DateTime<Utc>) -> Result<()> {
        self.redis
            .set(&self.redis_key(key), &value.to_rfc3339())
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get_timestamp(&self, key: &AttributeKey) -> Result<Option<DateTime<Utc>>> {
        let redis_key = self.redis_key(key);
        match self.redis.get(&redis_key).await? {
            Some(raw) => Self::parse_timestamp(&redis_key, &raw).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn take_timestamp(&self, key: &AttributeKey) -> Result<Option<DateTime<Utc>>> {
        let redis_key = self.redis_key(key);
        match self.redis.take(&redis_key).await? {
            Some(raw) => Self::parse_timestamp(&redis_key, &raw).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn restore_timestamp(&self, key: &AttributeKey, value: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .redis
            .set_nx(&self.redis_key(key), &value.to_rfc3339())
            .await?)
    }
}
