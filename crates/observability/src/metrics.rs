//! 采集指标收集模块
//!
//! 基于 `Batch` 与 `CaptureEvent` 收集和统计协调器的运行指标。

use std::collections::HashMap;

use contracts::{Batch, CaptureEvent};
use metrics::{counter, gauge, histogram};

/// 从 Batch 记录指标
///
/// 消费者每取到一个 Batch 时调用此函数。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_batch_metrics;
///
/// while let Some(batch) = coordinator.next_batch() {
///     record_batch_metrics(&batch);
///     // ...
/// }
/// ```
pub fn record_batch_metrics(batch: &Batch) {
    counter!("multicapture_batches_total").increment(1);

    // 序号 (用于检测丢批)
    gauge!("multicapture_last_sequence").set(batch.sequence as f64);

    let captured = batch.success_count();
    let missing = batch.len() - captured;
    gauge!("multicapture_sources_captured").set(captured as f64);
    gauge!("multicapture_sources_missing").set(missing as f64);

    if missing > 0 {
        counter!("multicapture_batches_incomplete_total").increment(1);
    }

    for record in batch {
        let status = if record.success() { "success" } else { "failure" };
        counter!(
            "multicapture_frames_total",
            "source_id" => record.source_id().to_string(),
            "status" => status
        )
        .increment(1);

        if let Some(image) = record.payload() {
            histogram!(
                "multicapture_frame_bytes",
                "source_id" => record.source_id().to_string()
            )
            .record(image.data.len() as f64);
        }
    }
}

/// 记录上报事件
pub fn record_event(event: &CaptureEvent) {
    let kind = event.kind();
    match event.source_id() {
        Some(source_id) => counter!(
            "multicapture_events_total",
            "kind" => kind,
            "source_id" => source_id.to_string()
        )
        .increment(1),
        None => counter!("multicapture_events_total", "kind" => kind).increment(1),
    }

    if let CaptureEvent::RateNotSustained { elapsed, .. } = event {
        histogram!("multicapture_overrun_cycle_ms").record(elapsed.as_secs_f64() * 1000.0);
    }
}

/// Batch 指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct BatchMetricsAggregator {
    /// 收到的 Batch 数
    pub total_batches: u64,

    /// 至少缺一路的 Batch 数
    pub incomplete_batches: u64,

    /// 序号跳变推断出的丢批数
    pub skipped_sequences: u64,

    /// Batch 到达间隔 (毫秒)
    pub interval_stats: RunningStats,

    /// 各源缺失次数
    pub missing_counts: HashMap<String, u64>,

    last_sequence: Option<u64>,
}

impl BatchMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    ///
    /// `interval_ms` 为距上一个 Batch 的到达间隔，首个 Batch 传 `None`。
    pub fn update(&mut self, batch: &Batch, interval_ms: Option<f64>) {
        self.total_batches += 1;

        if let Some(last) = self.last_sequence {
            self.skipped_sequences += batch.sequence.saturating_sub(last + 1);
        }
        self.last_sequence = Some(batch.sequence);

        let missing = batch.missing_sources();
        if !missing.is_empty() {
            self.incomplete_batches += 1;
            for source_id in missing {
                *self.missing_counts.entry(source_id.to_string()).or_insert(0) += 1;
            }
        }

        if let Some(interval) = interval_ms {
            self.interval_stats.push(interval);
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let rate = |n: u64| {
            if self.total_batches > 0 {
                n as f64 / self.total_batches as f64 * 100.0
            } else {
                0.0
            }
        };
        MetricsSummary {
            total_batches: self.total_batches,
            incomplete_batches: self.incomplete_batches,
            skipped_sequences: self.skipped_sequences,
            incomplete_rate: rate(self.incomplete_batches),
            interval_ms: StatsSummary::from(&self.interval_stats),
            source_missing_counts: self.missing_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_batches: u64,
    pub incomplete_batches: u64,
    pub skipped_sequences: u64,
    pub incomplete_rate: f64,
    pub interval_ms: StatsSummary,
    pub source_missing_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Capture Metrics Summary ===")?;
        writeln!(f, "Total batches: {}", self.total_batches)?;
        writeln!(
            f,
            "Incomplete batches: {} ({:.2}%)",
            self.incomplete_batches, self.incomplete_rate
        )?;
        writeln!(f, "Skipped sequences: {}", self.skipped_sequences)?;
        writeln!(f, "Batch interval (ms): {}", self.interval_ms)?;

        if !self.source_missing_counts.is_empty() {
            let mut counts: Vec<_> = self.source_missing_counts.iter().collect();
            counts.sort();
            writeln!(f, "Missing frames per source:")?;
            for (source, count) in counts {
                writeln!(f, "  {}: {}", source, count)?;
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
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
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
            self.m2 += delta * (value - self.mean);
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
}
