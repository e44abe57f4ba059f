//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 存储错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("存储数据格式错误: key={key}, {message}")]
    CorruptValue { key: String, message: String },

    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 序列化错误 ====================
    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Redis(_) => "REDIS_ERROR",
            Self::CorruptValue { .. } => "CORRUPT_VALUE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有连接类的瞬时故障值得重试，数据或配置错误重试也不会成功。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = SharedError::CorruptValue {
            key: "reward:attr:1".to_string(),
            message: "bad timestamp".to_string(),
        };
        assert_eq!(err.code(), "CORRUPT_VALUE");
        assert_eq!(SharedError::Internal("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_is_retryable() {
        assert!(!SharedError::Internal("boom".to_string()).is_retryable());

        let corrupt = SharedError::CorruptValue {
            key: "k".to_string(),
            message: "m".to_string(),
        };
        assert!(!corrupt.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SharedError::CorruptValue {
            key: "reward:attr:42".to_string(),
            message: "unexpected".to_string(),
        };
        assert!(err.to_string().contains("reward:attr:42"));
    }
}
