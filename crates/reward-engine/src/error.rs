//! 积分奖励引擎错误类型
//!
//! 只有外部协作方（属性存储、积分账本、目录服务等）的故障才会以错误返回；
//! 策略关闭、实体缺失等预期情况以 `AwardOutcome::Skipped` 表达，不属于错误。

use reward_shared::error::SharedError;
use thiserror::Error;

/// 积分奖励引擎错误类型
#[derive(Debug, Error)]
pub enum RewardError {
    // === 基础设施错误 ===
    #[error(transparent)]
    Shared(#[from] SharedError),

    #[error("属性存储错误: {0}")]
    AttributeStore(String),

    // === 外部协作方错误 ===
    #[error("积分账本写入失败: customer_id={customer_id}, {message}")]
    Ledger { customer_id: i64, message: String },

    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    // === 日期奖励规则错误 ===
    #[error("日期奖励规则不存在: {0}")]
    DateRuleNotFound(i64),

    #[error("日期奖励规则部分发放失败: rule_id={rule_id}, 失败 {failed}/{total}")]
    PartialSweepFailure {
        rule_id: i64,
        failed: usize,
        total: usize,
    },

    // === 通用错误 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分奖励引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, RewardError>;

impl RewardError {
    /// 构造外部服务错误
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// 检查是否为可重试的错误
    ///
    /// 部分发放失败由下一轮清扫自动重试，同样视为可重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Shared(e) => e.is_retryable(),
            Self::AttributeStore(_)
            | Self::Ledger { .. }
            | Self::ExternalService { .. }
            | Self::PartialSweepFailure { .. } => true,
            Self::DateRuleNotFound(_) | Self::Validation(_) | Self::Internal(_) => false,
        }
    }

    /// 获取错误码（用于日志与告警）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Shared(e) => e.code(),
            Self::AttributeStore(_) => "ATTRIBUTE_STORE_ERROR",
            Self::Ledger { .. } => "LEDGER_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::DateRuleNotFound(_) => "DATE_RULE_NOT_FOUND",
            Self::PartialSweepFailure { .. } => "PARTIAL_SWEEP_FAILURE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
