//! 指定日期奖励清扫
//!
//! 每次执行：
//! 1. 读取已到期且未完成的规则（不按店铺/角色过滤）
//! 2. 逐条规则原子抢占，抢占失败说明另一实例正在处理，跳过
//! 3. 解析目标店铺与目标客户，对 店铺 × 客户 逐一发放
//! 4. 全部成功后标记规则完成；有失败或有客户仍被其他实例抢占时释放规则，下一轮重试
//!
//! 每个 (规则, 店铺, 客户) 都有独立的幂等标记，重试时只补发失败的部分。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reward_shared::observability::metrics as reward_metrics;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::attributes::AttributeKey;
use crate::date_rules::DateRuleRepository;
use crate::error::{Result, RewardError};
use crate::models::{AwardCommand, Customer, DateAwardRule};
use crate::ports::Collaborators;
use crate::scheduler::Clock;
use crate::settings::SweepSettings;
use crate::tracker::IdempotencyTracker;

/// 单次清扫统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 到期未完成的规则数
    pub rules_due: usize,
    pub rules_fulfilled: usize,
    pub rules_failed: usize,
    /// 已被其他实例抢占的规则数
    pub rules_skipped: usize,
    /// 有客户标记仍被其他实例持有、留待下一轮的规则数
    pub rules_deferred: usize,
    pub awards_emitted: usize,
}

/// 单条规则的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleRun {
    Fulfilled { awarded: usize },
    Deferred { awarded: usize, pending: usize },
    ClaimedElsewhere,
}

/// 单个客户的发放结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecipientRun {
    Awarded,
    AlreadyAwarded,
    /// 标记被其他实例抢占且尚未提交，结果未知
    ClaimedElsewhere,
}

/// 单条规则全部目标的发放统计
#[derive(Debug, Clone, Copy, Default)]
struct RuleAwards {
    awarded: usize,
    pending: usize,
}

/// 指定日期奖励清扫任务
#[derive(Clone)]
pub struct DateAwardSweep {
    deps: Collaborators,
    rules: Arc<dyn DateRuleRepository>,
    tracker: IdempotencyTracker,
    clock: Arc<dyn Clock>,
    settings: SweepSettings,
}

impl DateAwardSweep {
    pub fn new(
        deps: Collaborators,
        rules: Arc<dyn DateRuleRepository>,
        tracker: IdempotencyTracker,
        clock: Arc<dyn Clock>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            deps,
            rules,
            tracker,
            clock,
            settings,
        }
    }

    /// 执行一次清扫
    ///
    /// 单条规则失败不影响其他规则，只计入 `rules_failed`；
    /// 只有读取到期规则失败时返回错误。
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let due = self.rules.list_due_unfulfilled(now).await?;
        let mut report = SweepReport {
            rules_due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!("没有到期的日期奖励规则");
            return Ok(report);
        }

        for rule in &due {
            let started = Instant::now();
            match self.process_rule(rule, now).await {
                Ok(RuleRun::Fulfilled { awarded }) => {
                    report.rules_fulfilled += 1;
                    report.awards_emitted += awarded;
                    reward_metrics::record_sweep_rule(
                        "fulfilled",
                        started.elapsed().as_secs_f64(),
                    );
                }
                Ok(RuleRun::Deferred { awarded, pending }) => {
                    report.rules_deferred += 1;
                    report.awards_emitted += awarded;
                    debug!(rule_id = rule.id, pending, "规则留待下一轮");
                    reward_metrics::record_sweep_rule("deferred", started.elapsed().as_secs_f64());
                }
                Ok(RuleRun::ClaimedElsewhere) => {
                    report.rules_skipped += 1;
                    reward_metrics::record_sweep_rule("skipped", started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    report.rules_failed += 1;
                    error!(rule_id = rule.id, error = %e, code = e.error_code(), "日期奖励规则处理失败");
                    reward_metrics::record_sweep_rule("failed", started.elapsed().as_secs_f64());
                }
            }
        }

        info!(
            rules_due = report.rules_due,
            fulfilled = report.rules_fulfilled,
            failed = report.rules_failed,
            skipped = report.rules_skipped,
            deferred = report.rules_deferred,
            awards = report.awards_emitted,
            "日期奖励清扫完成"
        );
        Ok(report)
    }

    async fn process_rule(&self, rule: &DateAwardRule, now: DateTime<Utc>) -> Result<RuleRun> {
        let claim_id = Uuid::new_v4().to_string();
        let expires_at = now + self.settings.rule_claim_ttl();
        if !self
            .rules
            .try_claim(rule.id, &claim_id, now, expires_at)
            .await?
        {
            debug!(rule_id = rule.id, "规则已被其他实例抢占");
            return Ok(RuleRun::ClaimedElsewhere);
        }

        match self.award_rule(rule).await {
            Ok(RuleAwards { awarded, pending }) if pending > 0 => {
                // 其他实例的发放可能失败并释放标记，规则不能在此时完成
                self.release_rule(rule.id, &claim_id).await;
                Ok(RuleRun::Deferred { awarded, pending })
            }
            Ok(RuleAwards { awarded, .. }) => {
                if !self.rules.complete(rule.id, &claim_id).await? {
                    warn!(rule_id = rule.id, "规则抢占已失效，完成标记未写入");
                }
                info!(rule_id = rule.id, awarded, "日期奖励规则已完成");
                Ok(RuleRun::Fulfilled { awarded })
            }
            Err(e) => {
                self.release_rule(rule.id, &claim_id).await;
                Err(e)
            }
        }
    }

    async fn release_rule(&self, rule_id: i64, claim_id: &str) {
        if let Err(e) = self.rules.release(rule_id, claim_id).await {
            warn!(rule_id, error = %e, "规则抢占释放失败，等待 TTL 过期");
        }
    }

    /// 向规则的全部目标发放，统计本次新发放数与仍被其他实例持有的客户数
    async fn award_rule(&self, rule: &DateAwardRule) -> Result<RuleAwards> {
        let stores = self.target_stores(rule).await?;
        let customers = self
            .deps
            .customers
            .find_customers_by_role(rule.role_scope())
            .await?;

        let recipients: Vec<(i64, &Customer)> = stores
            .iter()
            .flat_map(|store_id| customers.iter().map(move |customer| (*store_id, customer)))
            .collect();
        let total = recipients.len();
        debug!(
            rule_id = rule.id,
            stores = stores.len(),
            customers = customers.len(),
            total,
            "解析日期奖励目标"
        );

        let mut awards = RuleAwards::default();
        let mut failed = 0;
        // 分批并发，批次之间顺序执行以控制并发度
        for chunk in recipients.chunks(self.settings.max_concurrency.max(1)) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|(store_id, customer)| self.award_recipient(rule, *store_id, customer)),
            )
            .await;

            for ((store_id, customer), result) in chunk.iter().zip(results) {
                match result {
                    Ok(RecipientRun::Awarded) => awards.awarded += 1,
                    Ok(RecipientRun::AlreadyAwarded) => {}
                    Ok(RecipientRun::ClaimedElsewhere) => awards.pending += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(
                            rule_id = rule.id,
                            store_id,
                            customer_id = customer.id,
                            error = %e,
                            "日期奖励发放失败"
                        );
                    }
                }
            }
        }

        if failed > 0 {
            return Err(RewardError::PartialSweepFailure {
                rule_id: rule.id,
                failed,
                total,
            });
        }
        Ok(awards)
    }

    /// 目标店铺
    ///
    /// 规则限定店铺时只发该店铺；否则开启跨店累计时发当前店铺，关闭时发全部店铺。
    async fn target_stores(&self, rule: &DateAwardRule) -> Result<Vec<i64>> {
        if let Some(store_id) = rule.store_scope() {
            return Ok(vec![store_id]);
        }
        if self.settings.accumulate_all_stores {
            return Ok(vec![self.settings.current_store_id]);
        }
        let stores = self.deps.stores.all_stores().await?;
        Ok(stores.into_iter().map(|store| store.id).collect())
    }

    /// 向单个客户发放
    async fn award_recipient(
        &self,
        rule: &DateAwardRule,
        store_id: i64,
        customer: &Customer,
    ) -> Result<RecipientRun> {
        let mark = AttributeKey::date_award_recipient(rule.id, store_id, customer.id);
        if self.tracker.is_awarded(&mark).await? {
            return Ok(RecipientRun::AlreadyAwarded);
        }

        let language = self
            .deps
            .customers
            .preferred_language(customer.id, store_id)
            .await?;
        let message = self.deps.localizer.localize(&rule.message, language).await?;

        let Some(claim) = self.tracker.claim(&mark).await? else {
            return Ok(RecipientRun::ClaimedElsewhere);
        };
        let command = AwardCommand {
            customer_id: customer.id,
            store_id,
            points: rule.points,
            message,
            activation_time_utc: None,
        };
        match self.deps.ledger.record_award(&command).await {
            Ok(()) => {
                self.tracker.commit(claim).await?;
                reward_metrics::record_award("date_award", "success");
                Ok(RecipientRun::Awarded)
            }
            Err(e) => {
                self.tracker.release(claim).await;
                reward_metrics::record_award("date_award", "failed");
                Err(e)
            }
        }
    }
}
