//! 内存属性存储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{AttributeKey, AttributeStore, MarkState};
use crate::error::{Result, RewardError};

#[derive(Debug, Clone)]
enum StoredValue {
    Claimed {
        claim_id: String,
        expires_at: DateTime<Utc>,
    },
    Awarded,
    Timestamp(DateTime<Utc>),
}

/// 基于 DashMap 的属性存储
///
/// 条件写入通过 entry API 在分片锁内完成，同一键的并发操作互斥。
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    values: DashMap<AttributeKey, StoredValue>,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn type_mismatch(key: &AttributeKey, expected: &str) -> RewardError {
        RewardError::AttributeStore(format!("属性类型不匹配: key={key}, 期望 {expected}"))
    }
}

#[async_trait]
impl AttributeStore for MemoryAttributeStore {
    async fn mark_state(
        &self,
        key: &AttributeKey,
        now: DateTime<Utc>,
    ) -> Result<Option<MarkState>> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        match value.value() {
            StoredValue::Awarded => Ok(Some(MarkState::Awarded)),
            StoredValue::Claimed {
                claim_id,
                expires_at,
            } => {
                if *expires_at <= now {
                    Ok(None)
                } else {
                    Ok(Some(MarkState::Claimed {
                        claim_id: claim_id.clone(),
                    }))
                }
            }
            StoredValue::Timestamp(_) => Err(Self::type_mismatch(key, "mark")),
        }
    }

    async fn try_claim(
        &self,
        key: &AttributeKey,
        claim_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let claimed = StoredValue::Claimed {
            claim_id: claim_id.to_string(),
            expires_at,
        };
        match self.values.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(claimed);
                Ok(true)
            }
            Entry::Occupied(mut entry) => match entry.get() {
                StoredValue::Claimed {
                    expires_at: held_until,
                    ..
                } if *held_until <= now => {
                    entry.insert(claimed);
                    Ok(true)
                }
                StoredValue::Timestamp(_) => Err(Self::type_mismatch(key, "mark")),
                _ => Ok(false),
            },
        }
    }

    async fn commit_claim(&self, key: &AttributeKey, claim_id: &str) -> Result<bool> {
        match self.values.entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get() {
                StoredValue::Claimed { claim_id: held, .. } if held == claim_id => {
                    entry.insert(StoredValue::Awarded);
                    Ok(true)
                }
                _ => Ok(false),
            },
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn release_claim(&self, key: &AttributeKey, claim_id: &str) -> Result<bool> {
        let removed = self.values.remove_if(key, |_, value| {
            matches!(value, StoredValue::Claimed { claim_id: held, .. } if held == claim_id)
        });
        Ok(removed.is_some())
    }

    async fn set_timestamp(&self, key: &AttributeKey, value: DateTime<Utc>) -> Result<()> {
        self.values.insert(key.clone(), StoredValue::Timestamp(value));
        Ok(())
    }

    async fn get_timestamp(&self, key: &AttributeKey) -> Result<Option<DateTime<Utc>>> {
        match self.values.get(key).map(|v| v.value().clone()) {
            None => Ok(None),
            Some(StoredValue::Timestamp(ts)) => Ok(Some(ts)),
            Some(_) => Err(Self::type_mismatch(key, "timestamp")),
        }
    }

    async fn take_timestamp(&self, key: &AttributeKey) -> Result<Option<DateTime<Utc>>> {
        let removed = self
            .values
            .remove_if(key, |_, value| matches!(value, StoredValue::Timestamp(_)));
        match removed {
            Some((_, StoredValue::Timestamp(ts))) => Ok(Some(ts)),
            Some(_) => Err(Self::type_mismatch(key, "timestamp")),
            None if self.values.contains_key(key) => Err(Self::type_mismatch(key, "timestamp")),
            None => Ok(None),
        }
    }

    async fn restore_timestamp(&self, key: &AttributeKey, value: DateTime<Utc>) -> Result<bool> {
        match self.values.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::Timestamp(value));
                Ok(true)
            }
            Entry::Occupied(entry) => match entry.get() {
                StoredValue::Timestamp(_) => Ok(false),
                _ => Err(Self::type_mismatch(key, "timestamp")),
            },
        }
    }
}
