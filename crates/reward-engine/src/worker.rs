//! 日期奖励清扫 Worker
//!
//! 以固定间隔调用 `DateAwardSweep::run_once`，通过 watch channel 优雅退出。
//! 多实例同时运行是安全的，规则级抢占保证同一规则只被一个实例处理。
//! `reward.sweep.enabled = false` 时 Worker 不执行任何清扫。

use std::sync::Arc;
use std::time::Duration;

use reward_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::settings::SweepSettings;
use crate::sweep::{DateAwardSweep, SweepReport};

const WORKER_NAME: &str = "date_award_sweep";

/// 清扫 Worker
pub struct SweepWorker {
    sweep: Arc<DateAwardSweep>,
    poll_interval: Duration,
    enabled: bool,
}

impl SweepWorker {
    pub fn new(sweep: Arc<DateAwardSweep>, poll_interval: Duration) -> Self {
        Self {
            sweep,
            poll_interval,
            enabled: true,
        }
    }

    pub fn from_settings(sweep: Arc<DateAwardSweep>, settings: &SweepSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ..Self::new(sweep, settings.interval())
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 执行一轮清扫并记录 Worker 存活时间，禁用时返回 None
    pub async fn tick(&self) -> Option<SweepReport> {
        if !self.enabled {
            debug!("日期奖励清扫已禁用，跳过本轮");
            return None;
        }
        let report = match self.sweep.run_once().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "日期奖励清扫出错");
                None
            }
        };
        metrics::set_worker_last_run(WORKER_NAME);
        report
    }

    /// 主循环：立即执行一轮，之后每个间隔执行一轮，直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.enabled {
            info!("日期奖励清扫已禁用，SweepWorker 不启动");
            return;
        }
        info!(poll_interval = ?self.poll_interval, "SweepWorker 已启动");

        while !*shutdown.borrow() {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    // 发送端被丢弃同样视为关闭
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("SweepWorker 已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::attributes::MemoryAttributeStore;
    use crate::date_rules::MemoryDateRuleRepository;
    use crate::localization::PassthroughLocalizer;
    use crate::ports::{
        Collaborators, MockCartLookup, MockContentCatalog, MockCustomerDirectory,
        MockOrderLookup, MockRewardLedger, MockStoreDirectory,
    };
    use crate::scheduler::FixedClock;
    use crate::tracker::IdempotencyTracker;

    fn empty_sweep() -> Arc<DateAwardSweep> {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let deps = Collaborators {
            customers: Arc::new(MockCustomerDirectory::new()),
            catalog: Arc::new(MockContentCatalog::new()),
            orders: Arc::new(MockOrderLookup::new()),
            carts: Arc::new(MockCartLookup::new()),
            ledger: Arc::new(MockRewardLedger::new()),
            localizer: Arc::new(PassthroughLocalizer),
            stores: Arc::new(MockStoreDirectory::new()),
        };
        let tracker = IdempotencyTracker::new(
            Arc::new(MemoryAttributeStore::new()),
            clock.clone(),
            chrono::Duration::seconds(60),
        );
        Arc::new(DateAwardSweep::new(
            deps,
            Arc::new(MemoryDateRuleRepository::new()),
            tracker,
            clock,
            SweepSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_tick_with_no_rules() {
        let worker = SweepWorker::new(empty_sweep(), Duration::from_secs(60));
        let report = worker.tick().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_disabled_worker_never_sweeps() {
        let settings = SweepSettings {
            enabled: false,
            ..Default::default()
        };
        let worker = SweepWorker::from_settings(empty_sweep(), &settings);
        assert!(!worker.is_enabled());
        assert!(worker.tick().await.is_none());

        // 未发送关闭信号也应立即返回
        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(5), worker.run(rx))
            .await
            .expect("禁用的 worker 应立即返回");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let worker = SweepWorker::new(empty_sweep(), Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker 应在关闭信号后退出")
            .unwrap();
    }
}
