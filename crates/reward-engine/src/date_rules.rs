//! 日期奖励规则仓储
//!
//! 除规则的增删改查外，仓储还负责规则级的原子抢占：
//! 多个清扫实例同时运行时，同一条规则只会被一个实例处理。

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Result, RewardError};
use crate::models::{DateAwardRule, DateRuleQuery, NewDateAwardRule};

/// 日期奖励规则仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DateRuleRepository: Send + Sync {
    // 管理
    async fn list_rules(&self, query: &DateRuleQuery) -> Result<Vec<DateAwardRule>>;
    async fn get_rule(&self, rule_id: i64) -> Result<Option<DateAwardRule>>;
    async fn insert_rule(&self, rule: NewDateAwardRule) -> Result<DateAwardRule>;
    /// 更新规则内容，`fulfilled` 只能由清扫置位，不会被更新清除
    async fn update_rule(&self, rule: &DateAwardRule) -> Result<()>;
    async fn delete_rule(&self, rule_id: i64) -> Result<()>;

    // 清扫
    /// 已到期且未完成的规则，不按店铺/角色过滤
    async fn list_due_unfulfilled(&self, now: DateTime<Utc>) -> Result<Vec<DateAwardRule>>;

    /// 原子抢占规则：未完成且无有效抢占时成功
    async fn try_claim(
        &self,
        rule_id: i64,
        claim_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// 持有抢占时标记规则已完成
    async fn complete(&self, rule_id: i64, claim_id: &str) -> Result<bool>;

    /// 持有抢占时释放，规则保持未完成
    async fn release(&self, rule_id: i64, claim_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct RuleRecord {
    rule: DateAwardRule,
    claim: Option<(String, DateTime<Utc>)>,
}

impl RuleRecord {
    fn held_by(&self, claim_id: &str) -> bool {
        matches!(&self.claim, Some((held, _)) if held == claim_id)
    }
}

/// 内存规则仓储
#[derive(Debug)]
pub struct MemoryDateRuleRepository {
    rules: DashMap<i64, RuleRecord>,
    next_id: AtomicI64,
}

impl Default for MemoryDateRuleRepository {
    fn default() -> Self {
        Self {
            rules: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryDateRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DateRuleRepository for MemoryDateRuleRepository {
    async fn list_rules(&self, query: &DateRuleQuery) -> Result<Vec<DateAwardRule>> {
        let mut rules: Vec<DateAwardRule> = self
            .rules
            .iter()
            .filter(|entry| query.matches(&entry.rule))
            .map(|entry| entry.rule.clone())
            .collect();
        rules.sort_by(|a, b| {
            b.awarding_date_utc
                .cmp(&a.awarding_date_utc)
                .then(a.id.cmp(&b.id))
        });
        Ok(rules)
    }

    async fn get_rule(&self, rule_id: i64) -> Result<Option<DateAwardRule>> {
        Ok(self.rules.get(&rule_id).map(|entry| entry.rule.clone()))
    }

    async fn insert_rule(&self, rule: NewDateAwardRule) -> Result<DateAwardRule> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let rule = rule.into_rule(id);
        self.rules.insert(
            id,
            RuleRecord {
                rule: rule.clone(),
                claim: None,
            },
        );
        Ok(rule)
    }

    async fn update_rule(&self, rule: &DateAwardRule) -> Result<()> {
        let mut record = self
            .rules
            .get_mut(&rule.id)
            .ok_or(RewardError::DateRuleNotFound(rule.id))?;
        let fulfilled = record.rule.fulfilled || rule.fulfilled;
        record.rule = DateAwardRule {
            fulfilled,
            ..rule.clone()
        };
        Ok(())
    }

    async fn delete_rule(&self, rule_id: i64) -> Result<()> {
        self.rules
            .remove(&rule_id)
            .map(|_| ())
            .ok_or(RewardError::DateRuleNotFound(rule_id))
    }

    async fn list_due_unfulfilled(&self, now: DateTime<Utc>) -> Result<Vec<DateAwardRule>> {
        let mut rules: Vec<DateAwardRule> = self
            .rules
            .iter()
            .filter(|entry| entry.rule.is_due(now))
            .map(|entry| entry.rule.clone())
            .collect();
        rules.sort_by_key(|rule| (rule.awarding_date_utc, rule.id));
        Ok(rules)
    }

    async fn try_claim(
        &self,
        rule_id: i64,
        claim_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Entry::Occupied(mut entry) = self.rules.entry(rule_id) else {
            return Ok(false);
        };
        let record = entry.get_mut();
        if record.rule.fulfilled {
            return Ok(false);
        }
        if let Some((_, held_until)) = &record.claim
            && *held_until > now
        {
            return Ok(false);
        }
        record.claim = Some((claim_id.to_string(), expires_at));
        Ok(true)
    }

    async fn complete(&self, rule_id: i64, claim_id: &str) -> Result<bool> {
        let Some(mut record) = self.rules.get_mut(&rule_id) else {
            return Ok(false);
        };
        if !record.held_by(claim_id) {
            return Ok(false);
        }
        record.rule.fulfilled = true;
        record.claim = None;
        Ok(true)
    }

    async fn release(&self, rule_id: i64, claim_id: &str) -> Result<bool> {
        let Some(mut record) = self.rules.get_mut(&rule_id) else {
            return Ok(false);
        };
        if !record.held_by(claim_id) {
            return Ok(false);
        }
        record.claim = None;
        Ok(true)
    }
}
