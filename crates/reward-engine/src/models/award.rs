//! 发放指令与评估结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::TriggerKind;

/// 积分发放指令，交由外部积分账本记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardCommand {
    pub customer_id: i64,
    pub store_id: i64,
    pub points: i32,
    pub message: String,
    /// None 表示立即激活
    pub activation_time_utc: Option<DateTime<Utc>>,
}

impl AwardCommand {
    pub fn is_immediate(&self) -> bool {
        self.activation_time_utc.is_none()
    }
}

/// 未发放的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// 策略未启用
    PolicyDisabled,
    /// 客户 ID 无效（游客等）
    AnonymousCustomer,
    /// 客户不存在
    CustomerNotFound,
    /// 已为该实体发放过
    AlreadyAwarded,
    /// 关联的博文、新闻或商品不存在
    EntityNotFound,
    /// 不是首个已支付订单
    NotFirstPurchase,
    /// 没有记录购物开始时间
    NoPurchaseStart,
    /// 超出快速购买时间窗口
    WindowExceeded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyDisabled => "policy_disabled",
            Self::AnonymousCustomer => "anonymous_customer",
            Self::CustomerNotFound => "customer_not_found",
            Self::AlreadyAwarded => "already_awarded",
            Self::EntityNotFound => "entity_not_found",
            Self::NotFirstPurchase => "not_first_purchase",
            Self::NoPurchaseStart => "no_purchase_start",
            Self::WindowExceeded => "window_exceeded",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个触发的评估结果
#[derive(Debug, Clone, PartialEq)]
pub enum AwardOutcome {
    Awarded(AwardCommand),
    Skipped(SkipReason),
}

impl AwardOutcome {
    pub fn is_awarded(&self) -> bool {
        matches!(self, Self::Awarded(_))
    }

    pub fn command(&self) -> Option<&AwardCommand> {
        match self {
            Self::Awarded(command) => Some(command),
            Self::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Awarded(_) => None,
            Self::Skipped(reason) => Some(*reason),
        }
    }
}

/// 带触发类型的评估结果，用于统一事件分发
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOutcome {
    pub trigger: TriggerKind,
    pub outcome: AwardOutcome,
}

impl TriggerOutcome {
    pub fn new(trigger: TriggerKind, outcome: AwardOutcome) -> Self {
        Self { trigger, outcome }
    }
}
