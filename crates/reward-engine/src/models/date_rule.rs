//! 指定日期奖励规则模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 指定日期奖励规则
///
/// 到达 `awarding_date_utc` 后由清扫任务向目标人群发放一次积分，
/// 发放完成后标记 `fulfilled`，此后不再处理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateAwardRule {
    pub id: i64,
    pub points: i32,
    pub message: String,
    pub awarding_date_utc: DateTime<Utc>,
    /// 0 表示所有店铺
    pub store_id: i64,
    /// 0 表示所有客户角色
    pub customer_role_id: i64,
    pub fulfilled: bool,
}

impl DateAwardRule {
    /// 是否已到发放时间且尚未完成
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.fulfilled && self.awarding_date_utc <= now
    }

    /// 限定的店铺，0 返回 None
    pub fn store_scope(&self) -> Option<i64> {
        (self.store_id > 0).then_some(self.store_id)
    }

    /// 限定的客户角色，0 返回 None
    pub fn role_scope(&self) -> Option<i64> {
        (self.customer_role_id > 0).then_some(self.customer_role_id)
    }
}

/// 新建日期奖励规则请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDateAwardRule {
    pub points: i32,
    pub message: String,
    pub awarding_date_utc: DateTime<Utc>,
    pub store_id: i64,
    pub customer_role_id: i64,
}

impl NewDateAwardRule {
    pub fn into_rule(self, id: i64) -> DateAwardRule {
        DateAwardRule {
            id,
            points: self.points,
            message: self.message,
            awarding_date_utc: self.awarding_date_utc,
            store_id: self.store_id,
            customer_role_id: self.customer_role_id,
            fulfilled: false,
        }
    }
}

/// 规则列表查询条件
///
/// - `store_id > 0`：只返回适用于所有店铺（0）或该店铺的规则
/// - `role_id > 0`：只返回适用于所有角色（0）或该角色的规则
/// - `date`：只返回发放时间不晚于该时间的规则
///
/// 结果按发放时间倒序。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateRuleQuery {
    pub store_id: i64,
    pub role_id: i64,
    pub date: Option<DateTime<Utc>>,
}

impl DateRuleQuery {
    pub fn matches(&self, rule: &DateAwardRule) -> bool {
        if self.store_id > 0 && rule.store_id != 0 && rule.store_id != self.store_id {
            return false;
        }
        if self.role_id > 0 && rule.customer_role_id != 0 && rule.customer_role_id != self.role_id
        {
            return false;
        }
        if let Some(date) = self.date
            && rule.awarding_date_utc > date
        {
            return false;
        }
        true
    }
}
