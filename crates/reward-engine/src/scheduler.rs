//! 激活时间计算
//!
//! 根据策略配置的相对延迟计算积分的绝对激活时间。
//! 当前时间通过 `Clock` 注入，测试中可使用固定时钟。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::models::{AwardPolicy, DelayUnit};

/// 时间源
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 可手动拨动的固定时钟
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, delta: Duration) {
        let mut guard = self.now.write();
        *guard = *guard + delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// 计算激活时间
///
/// `delay <= 0` 返回 None（立即激活），否则返回 `now + delay * 单位小时数`。
/// 超出可表示范围的延迟截断到 `DateTime::<Utc>::MAX_UTC`。
pub fn activation_time(delay: i32, unit: DelayUnit, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if delay <= 0 {
        return None;
    }
    let at = Duration::try_hours(i64::from(delay).saturating_mul(unit.to_hours()))
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    Some(at)
}

/// 激活时间调度器
#[derive(Clone)]
pub struct ActivationScheduler {
    clock: Arc<dyn Clock>,
}

impl ActivationScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn compute(&self, delay: i32, unit: DelayUnit) -> Option<DateTime<Utc>> {
        activation_time(delay, unit, self.clock.now())
    }

    pub fn for_policy(&self, policy: &AwardPolicy) -> Option<DateTime<Utc>> {
        self.compute(policy.activation_delay, policy.activation_delay_unit)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for ActivationScheduler {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
