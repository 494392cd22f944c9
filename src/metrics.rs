//! Performance metrics and statistics tracking for the diagnosis pipeline.

use crate::pipeline::Stage;
use crate::types::tensor::ClassIndex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Diagnoses that produced a record
    pub diagnoses_completed: AtomicU64,
    /// Diagnoses that failed at any stage
    pub diagnoses_failed: AtomicU64,
    /// Failures by stage
    failures_by_stage: RwLock<HashMap<Stage, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Diagnoses per class index
    class_counts: RwLock<BTreeMap<usize, u64>>,
    /// Confidence distribution buckets
    confidence_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            diagnoses_completed: AtomicU64::new(0),
            diagnoses_failed: AtomicU64::new(0),
            failures_by_stage: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            class_counts: RwLock::new(BTreeMap::new()),
            confidence_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a completed diagnosis
    pub fn record_diagnosis(&self, processing_time: Duration, index: ClassIndex, confidence: f32) {
        self.diagnoses_completed.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut counts) = self.class_counts.write() {
            *counts.entry(index.get()).or_insert(0) += 1;
        }

        let bucket = (confidence.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.confidence_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed diagnosis
    pub fn record_failure(&self, processing_time: Duration, stage: Stage) {
        self.diagnoses_failed.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut by_stage) = self.failures_by_stage.write() {
            *by_stage.entry(stage).or_insert(0) += 1;
        }
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get failures by stage
    pub fn get_failures_by_stage(&self) -> HashMap<Stage, u64> {
        self.failures_by_stage
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get diagnoses per class index
    pub fn get_class_counts(&self) -> BTreeMap<usize, u64> {
        self.class_counts
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get confidence distribution
    pub fn get_confidence_distribution(&self) -> [u64; 10] {
        self.confidence_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Get current throughput (diagnoses per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.diagnoses_completed.load(Ordering::Relaxed)
            + self.diagnoses_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let completed = self.diagnoses_completed.load(Ordering::Relaxed);
        let failed = self.diagnoses_failed.load(Ordering::Relaxed);
        let total = completed + failed;
        let failure_rate = if total > 0 {
            (failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              DIAGNOSIS PIPELINE - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Diagnoses Completed:    {:>8}  │  Throughput: {:>6.1} img/s ║",
            completed, throughput
        );
        info!(
            "║ Diagnoses Failed:       {:>8}  │  Failure Rate: {:>5.1}%    ║",
            failed, failure_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6}",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );

        let failures = self.get_failures_by_stage();
        if !failures.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Stage:                                           ║");
            for (stage, count) in &failures {
                info!("║   {:10}: {:>6}", stage.as_str(), count);
            }
        }

        let classes = self.get_class_counts();
        if !classes.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Diagnoses by Class:                                          ║");
            for (index, count) in &classes {
                info!("║   class {:>3}: {:>6}", index, count);
            }
        }

        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Confidence Distribution:                                     ║");
        let dist = self.get_confidence_distribution();
        let confident_total: u64 = dist.iter().sum();
        for (i, &count) in dist.iter().enumerate() {
            let pct = if confident_total > 0 {
                (count as f64 / confident_total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let period = Duration::from_secs(self.interval_secs);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
