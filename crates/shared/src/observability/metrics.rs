//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metrics 资源守卫
pub struct MetricsHandle {
    pub addr: SocketAddr,
}

/// 初始化 Prometheus 指标导出
///
/// 安装全局 recorder，并在指定端口启动 `/metrics` HTTP 监听。
/// 必须在 tokio 运行时内调用。
pub fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    register_common_metrics(service_name);
    info!("Metrics server listening on {}", addr);

    Ok(MetricsHandle { addr })
}

/// 注册通用指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("reward_awards_total", "Total number of reward point awards");
    metrics::describe_counter!(
        "reward_skips_total",
        "Total number of evaluations that ended without an award"
    );
    metrics::describe_counter!(
        "reward_sweep_rules_total",
        "Total number of date award rules processed by the sweep"
    );
    metrics::describe_histogram!(
        "reward_sweep_rule_duration_seconds",
        "Date award rule processing duration in seconds"
    );
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last completed worker iteration"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录积分发放
#[inline]
pub fn record_award(trigger: &str, status: &str) {
    metrics::counter!(
        "reward_awards_total",
        "trigger" => trigger.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录未发放的评估及原因
#[inline]
pub fn record_skip(trigger: &str, reason: &str) {
    metrics::counter!(
        "reward_skips_total",
        "trigger" => trigger.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录日期奖励规则处理结果
#[inline]
pub fn record_sweep_rule(status: &str, duration_secs: f64) {
    metrics::counter!("reward_sweep_rules_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("reward_sweep_rule_duration_seconds", "status" => status.to_string())
        .record(duration_secs);
}

/// 记录 Worker 最近一次运行时间，供告警判断 Worker 是否存活
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string())
        .set(chrono::Utc::now().timestamp() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_award("blog_comment", "success");
        record_skip("fast_purchase", "window_exceeded");
        record_sweep_rule("fulfilled", 0.2);
        set_worker_last_run("date_award_sweep");
    }
}
