//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 环境变量前缀，如 REWARD_REDIS__URL -> redis.url
pub const ENV_PREFIX: &str = "REWARD";

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    /// 所有 key 的统一前缀，多套环境共用一个 Redis 时用于隔离
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "reward".to_string(),
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub redis: RedisConfig,
    pub observability: ObservabilityConfig,
}

/// 构建分层配置源
///
/// 加载顺序（后加载的会覆盖先加载的同名配置项）：
/// 1. {CONFIG_DIR}/default.toml（默认配置）
/// 2. {CONFIG_DIR}/{environment}.toml（环境特定配置）
/// 3. {CONFIG_DIR}/{service_name}.toml（服务特定配置）
/// 4. 环境变量（REWARD_ 前缀，层级用 `__` 分隔，如 REWARD_REDIS__URL -> redis.url）
///
/// 各组件在此基础上反序列化各自关心的配置节。
pub fn builder(service_name: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let env = std::env::var("REWARD_ENV").unwrap_or_else(|_| "development".to_string());
    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

    let builder = Config::builder()
        .set_default("service_name", service_name)?
        .set_default("environment", env.clone())?
        .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
        .add_source(
            File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
        )
        .add_source(
            File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                .required(false),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    Ok(builder)
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        builder(service_name)?.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
