//! 调度指标收集模块
//!
//! 记录凭证轮换、重试退避、熔断器与批次执行的运行指标。

use contracts::{AttemptRecord, FailureKind};
use metrics::{counter, gauge, histogram};
use std::collections::{BTreeMap, HashMap};

/// 记录一次外部调用尝试
///
/// `outcome` 为 `success` 或失败分类 (`auth_failure` / `rate_limited` / `transient`)。
pub fn record_attempt(service: &str, outcome: &str) {
    counter!(
        "quota_relay_attempts_total",
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录重试退避等待 (秒)
pub fn record_backoff(service: &str, secs: f64) {
    histogram!("quota_relay_backoff_seconds", "service" => service.to_string()).record(secs);
}

/// 记录凭证池全量隔离后的冷却
pub fn record_pool_cooldown(service: &str) {
    counter!("quota_relay_pool_cooldowns_total", "service" => service.to_string()).increment(1);
}

/// 记录凭证被隔离
pub fn record_credential_quarantined(service: &str) {
    counter!(
        "quota_relay_credentials_quarantined_total",
        "service" => service.to_string()
    )
    .increment(1);
}

/// 记录熔断器失败计数
pub fn record_breaker_failure(consecutive: u32) {
    counter!("quota_relay_breaker_failures_total").increment(1);
    gauge!("quota_relay_breaker_consecutive_failures").set(consecutive as f64);
}

/// 熔断器复位
pub fn record_breaker_reset() {
    gauge!("quota_relay_breaker_consecutive_failures").set(0.0);
}

/// 记录熔断器跳闸
pub fn record_breaker_trip() {
    counter!("quota_relay_breaker_trips_total").increment(1);
    gauge!("quota_relay_breaker_tripped").set(1.0);
}

/// 记录任务完成
///
/// `status` 为 `succeeded` / `failed` / `cancelled`。
pub fn record_task_completed(status: &str, duration_ms: f64) {
    counter!("quota_relay_tasks_total", "status" => status.to_string()).increment(1);
    histogram!("quota_relay_task_duration_ms").record(duration_ms);
}

/// 记录子批次完成
pub fn record_batch_completed(destination: &str, succeeded: usize, failed: usize, cancelled: usize) {
    let dest = destination.to_string();
    counter!("quota_relay_batches_total", "destination" => dest.clone()).increment(1);
    counter!(
        "quota_relay_batch_tasks_total",
        "destination" => dest.clone(),
        "status" => "succeeded"
    )
    .increment(succeeded as u64);
    counter!(
        "quota_relay_batch_tasks_total",
        "destination" => dest.clone(),
        "status" => "failed"
    )
    .increment(failed as u64);
    if cancelled > 0 {
        counter!(
            "quota_relay_batch_tasks_total",
            "destination" => dest,
            "status" => "cancelled"
        )
        .increment(cancelled as u64);
    }
}

/// 记录交付数量
pub fn record_delivered(destination: &str, count: u32) {
    counter!(
        "quota_relay_delivered_total",
        "destination" => destination.to_string()
    )
    .increment(count as u64);
}

/// 记录目标进度
pub fn record_destination_progress(destination: &str, delivered: u32, target: u32) {
    gauge!(
        "quota_relay_destination_delivered",
        "destination" => destination.to_string()
    )
    .set(delivered as f64);
    gauge!(
        "quota_relay_destination_target",
        "destination" => destination.to_string()
    )
    .set(target as f64);
}

/// 运行指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RunStatsAggregator {
    /// 已完成批次数
    pub batches: u64,

    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,

    /// 失败尝试按分类计数
    pub failed_attempts: HashMap<FailureKind, u64>,

    /// 任务耗时统计 (毫秒)
    pub task_duration_ms: RunningStats,

    /// 批次大小统计
    pub batch_size: RunningStats,
}

impl RunStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录单个任务结果
    pub fn record_task(&mut self, success: bool, duration_ms: f64, history: &[AttemptRecord]) {
        if success {
            self.tasks_succeeded += 1;
        } else {
            self.tasks_failed += 1;
        }
        self.task_duration_ms.push(duration_ms);
        self.record_attempts(history);
    }

    /// 记录失败尝试
    pub fn record_attempts(&mut self, history: &[AttemptRecord]) {
        for record in history {
            *self.failed_attempts.entry(record.kind).or_insert(0) += 1;
        }
    }

    /// 记录批次
    pub fn record_batch(&mut self, size: usize, cancelled: usize) {
        self.batches += 1;
        self.tasks_cancelled += cancelled as u64;
        self.batch_size.push(size as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> RunStatsSummary {
        let total = self.tasks_succeeded + self.tasks_failed;
        RunStatsSummary {
            batches: self.batches,
            tasks_succeeded: self.tasks_succeeded,
            tasks_failed: self.tasks_failed,
            tasks_cancelled: self.tasks_cancelled,
            success_rate: if total > 0 {
                self.tasks_succeeded as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            failed_attempts: self
                .failed_attempts
                .iter()
                .map(|(kind, count)| (kind.as_str().to_string(), *count))
                .collect(),
            task_duration_ms: StatsSummary::from(&self.task_duration_ms),
            batch_size: StatsSummary::from(&self.batch_size),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct RunStatsSummary {
    pub batches: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub success_rate: f64,
    pub failed_attempts: BTreeMap<String, u64>,
    pub task_duration_ms: StatsSummary,
    pub batch_size: StatsSummary,
}

impl std::fmt::Display for RunStatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Run Metrics Summary ===")?;
        writeln!(f, "Batches: {}", self.batches)?;
        writeln!(
            f,
            "Tasks: {} succeeded, {} failed, {} cancelled ({:.2}% success)",
            self.tasks_succeeded, self.tasks_failed, self.tasks_cancelled, self.success_rate
        )?;
        writeln!(f, "Task duration (ms): {}", self.task_duration_ms)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;

        if !self.failed_attempts.is_empty() {
            writeln!(f, "Failed attempts:")?;
            for (kind, count) in &self.failed_attempts {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
