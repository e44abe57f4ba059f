//! 引擎配置
//!
//! 从共享的分层配置中读取 `reward` 配置节：
//!
//! ```toml
//! [reward]
//! mark_claim_ttl_seconds = 300
//!
//! [reward.policies.blog_comment]
//! enabled = true
//! points = 50
//!
//! [reward.sweep]
//! interval_seconds = 3600
//! accumulate_all_stores = false
//! ```
//!
//! 环境变量覆盖示例：`REWARD_REWARD__POLICIES__BLOG_COMMENT__POINTS=80`

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Duration;
use config::ConfigError;
use reward_shared::config as shared_config;
use reward_shared::error::SharedError;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use crate::error::Result;
use crate::models::{PolicySet, TriggerKind};
use crate::tracker::DEFAULT_CLAIM_TTL_SECONDS;

/// 配置节名称
pub const SECTION: &str = "reward";

/// 日期奖励清扫配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub enabled: bool,
    /// 轮询间隔（秒）
    pub interval_seconds: u64,
    /// 开启后，未限定店铺的规则只在当前店铺发放
    pub accumulate_all_stores: bool,
    /// 当前店铺 ID，`accumulate_all_stores` 开启时使用
    pub current_store_id: i64,
    /// 单条规则内并发发放数
    pub max_concurrency: usize,
    /// 规则抢占有效期（秒），超时后其他实例可以接管
    pub rule_claim_ttl_seconds: i64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            accumulate_all_stores: false,
            current_store_id: 0,
            max_concurrency: 8,
            rule_claim_ttl_seconds: 1800,
        }
    }
}

impl SweepSettings {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn rule_claim_ttl(&self) -> Duration {
        Duration::seconds(self.rule_claim_ttl_seconds.max(1))
    }
}

/// 积分奖励引擎配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RewardSettings {
    pub policies: PolicySet,
    pub sweep: SweepSettings,
    /// 幂等标记抢占有效期（秒）
    pub mark_claim_ttl_seconds: i64,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            policies: PolicySet::default(),
            sweep: SweepSettings::default(),
            mark_claim_ttl_seconds: DEFAULT_CLAIM_TTL_SECONDS,
        }
    }
}

impl RewardSettings {
    /// 加载配置，`reward` 配置节缺失时使用默认值
    pub fn load(service_name: &str) -> Result<Self> {
        let source = shared_config::builder(service_name)
            .and_then(|builder| builder.build())
            .map_err(SharedError::from)?;

        let settings = match source.get::<RewardSettings>(SECTION) {
            Ok(settings) => settings.normalized(),
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => return Err(SharedError::from(e).into()),
        };
        info!(
            enabled = ?settings.enabled_triggers(),
            sweep_interval = settings.sweep.interval_seconds,
            "积分奖励配置已加载"
        );
        Ok(settings)
    }

    /// 补齐部分配置的策略缺省项（消息模板、快速购买窗口）
    pub fn normalized(mut self) -> Self {
        let defaults = PolicySet::default();
        for kind in TriggerKind::ALL {
            let policy = self.policies.get_mut(kind);
            let default = defaults.get(kind);
            if policy.message_template.is_empty() {
                policy.message_template = default.message_template.clone();
            }
            if policy.fast_purchase_window_minutes.is_none() {
                policy.fast_purchase_window_minutes = default.fast_purchase_window_minutes;
            }
        }
        self
    }

    pub fn mark_claim_ttl(&self) -> Duration {
        Duration::seconds(self.mark_claim_ttl_seconds.max(1))
    }

    pub fn enabled_triggers(&self) -> Vec<TriggerKind> {
        TriggerKind::ALL
            .into_iter()
            .filter(|kind| self.policies.get(*kind).enabled)
            .collect()
    }
}

/// 可热更新的策略集合
///
/// 读取为一次原子 load；外部配置界面通过 `update` 替换整套策略，
/// 订阅方经 watch channel 收到变更通知。
#[derive(Clone)]
pub struct DynamicPolicies {
    current: Arc<ArcSwap<PolicySet>>,
    tx: watch::Sender<Arc<PolicySet>>,
    rx: watch::Receiver<Arc<PolicySet>>,
}

impl DynamicPolicies {
    pub fn new(policies: PolicySet) -> Self {
        let policies = Arc::new(policies);
        let (tx, rx) = watch::channel(policies.clone());
        Self {
            current: Arc::new(ArcSwap::from(policies)),
            tx,
            rx,
        }
    }

    /// 当前策略快照
    pub fn load(&self) -> Arc<PolicySet> {
        self.current.load_full()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PolicySet>> {
        self.rx.clone()
    }

    pub fn update(&self, policies: PolicySet) {
        let policies = Arc::new(policies);
        self.current.store(policies.clone());
        // 没有订阅方时 send 失败，忽略
        let _ = self.tx.send(policies);
        info!("积分奖励策略已更新");
    }
}

impl Default for DynamicPolicies {
    fn default() -> Self {
        Self::new(PolicySet::default())
    }
}
