//! Run statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::Batch;
use observability::BatchMetricsAggregator;
use sync_engine::StatsSnapshot;

/// Statistics from a capture run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Batches taken from the output channel
    pub batches_received: u64,

    /// Frames delivered with a payload
    pub frames_captured: u64,

    /// Entries marked as missing
    pub frames_missing: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Number of configured sources
    pub sources: usize,

    /// Coordinator counters at shutdown
    pub coordinator: StatsSnapshot,

    /// Reported events by kind
    pub events: BTreeMap<&'static str, u64>,

    /// Consumer-side batch metrics
    pub batch_metrics: BatchMetricsAggregator,
}

impl RunStats {
    pub fn record_batch(&mut self, batch: &Batch, interval_ms: Option<f64>) {
        let captured = batch.success_count() as u64;
        self.batches_received += 1;
        self.frames_captured += captured;
        self.frames_missing += batch.len() as u64 - captured;
        self.batch_metrics.update(batch, interval_ms);
    }

    /// Batches per second actually consumed
    pub fn batch_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.batches_received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of missing entries as percentage
    pub fn missing_rate(&self) -> f64 {
        let total = self.frames_captured + self.frames_missing;
        if total > 0 {
            (self.frames_missing as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Capture Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Sources: {}", self.sources);
        println!("   ├─ Batches received: {}", self.batches_received);
        println!("   ├─ Batch rate: {:.2}/s", self.batch_rate());
        println!(
            "   └─ Frames captured: {} (missing {}, {:.2}%)",
            self.frames_captured,
            self.frames_missing,
            self.missing_rate()
        );

        let c = &self.coordinator;
        println!("\nCoordinator");
        println!("   ├─ Cycles: {}", c.cycles);
        println!("   ├─ Batches published: {}", c.batches_published);
        println!("   ├─ Batches dropped (channel full): {}", c.batches_dropped);
        println!("   ├─ Source timeouts: {}", c.source_timeouts);
        println!("   └─ Overrun cycles: {}", c.overruns);

        let summary = self.batch_metrics.summary();
        println!("\nConsumer");
        println!("   ├─ Skipped sequences: {}", summary.skipped_sequences);
        println!("   └─ Batch interval (ms): {}", summary.interval_ms);

        if !summary.source_missing_counts.is_empty() {
            let mut counts: Vec<_> = summary.source_missing_counts.iter().collect();
            counts.sort();
            println!("\nMissing frames per source");
            for (source, count) in counts {
                println!("   ├─ {}: {}", source, count);
            }
        }

        if !self.events.is_empty() {
            println!("\nEvents");
            for (kind, count) in &self.events {
                println!("   ├─ {}: {}", kind, count);
            }
        }

        println!();
    }
}
