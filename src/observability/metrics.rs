//! Thread-safe metrics collection
//!
//! Atomic counters for task lifecycle and queue activity, plus
//! mutex-protected collections for run durations and per-capability step
//! statistics. A snapshot is served as JSON on `/metrics`.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Cap on retained duration samples per series
const MAX_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

pub struct MetricsCollector {
    // Task lifecycle
    tasks_submitted: AtomicU64,
    tasks_rejected: AtomicU64,
    tasks_processing: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    duplicate_deliveries: AtomicU64,

    // Queue
    jobs_enqueued: AtomicU64,
    queue_depth: AtomicU64,
    max_queue_depth: AtomicU64,

    // Steps
    step_attempts: AtomicU64,
    step_retries: AtomicU64,

    run_durations: Mutex<Vec<u64>>, // milliseconds
    capability_stats: Mutex<HashMap<String, CapabilityStats>>,

    started_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_rejected: AtomicU64::new(0),
            tasks_processing: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            duplicate_deliveries: AtomicU64::new(0),
            jobs_enqueued: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            max_queue_depth: AtomicU64::new(0),
            step_attempts: AtomicU64::new(0),
            step_retries: AtomicU64::new(0),
            run_durations: Mutex::new(Vec::new()),
            capability_stats: Mutex::new(HashMap::new()),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    // Task lifecycle
    pub fn task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_processing_started(&self) {
        self.tasks_processing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        saturating_decrement(&self.tasks_processing);
    }

    /// A task can fail straight from PENDING, so the gauge never goes below zero
    pub fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        saturating_decrement(&self.tasks_processing);
    }

    pub fn duplicate_delivery_skipped(&self) {
        self.duplicate_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    // Queue
    pub fn job_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        let depth = self.queue_depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_queue_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn job_dequeued(&self) {
        saturating_decrement(&self.queue_depth);
    }

    // Steps
    pub fn record_step_attempt(&self, capability: &str, duration: Duration, success: bool) {
        self.step_attempts.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut stats) = self.capability_stats.lock() {
            let entry = stats.entry(capability.to_string()).or_default();
            entry.attempts += 1;
            if !success {
                entry.failures += 1;
            }
            push_sample(&mut entry.durations, duration);
        }
    }

    pub fn step_retried(&self) {
        self.step_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_duration(&self, duration: Duration) {
        if let Ok(mut durations) = self.run_durations.lock() {
            push_sample(&mut durations, duration);
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.tasks_submitted,
            &self.tasks_rejected,
            &self.tasks_processing,
            &self.tasks_completed,
            &self.tasks_failed,
            &self.duplicate_deliveries,
            &self.jobs_enqueued,
            &self.queue_depth,
            &self.max_queue_depth,
            &self.step_attempts,
            &self.step_retries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut durations) = self.run_durations.lock() {
            durations.clear();
        }
        if let Ok(mut stats) = self.capability_stats.lock() {
            stats.clear();
        }
        self.started_at.store(current_timestamp(), Ordering::Relaxed);
    }

    fn run_duration_statistics(&self) -> (f64, f64, f64) {
        let Ok(durations) = self.run_durations.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if durations.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let mut sorted = durations.clone();
        sorted.sort_unstable();

        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (avg, percentile(&sorted, 50.0), percentile(&sorted, 95.0))
    }

    fn capability_snapshots(&self) -> HashMap<String, CapabilityStatsSnapshot> {
        let Ok(stats) = self.capability_stats.lock() else {
            return HashMap::new();
        };
        stats
            .iter()
            .map(|(name, s)| {
                let avg = if s.durations.is_empty() {
                    0.0
                } else {
                    s.durations.iter().sum::<u64>() as f64 / s.durations.len() as f64
                };
                let success_rate = if s.attempts == 0 {
                    0.0
                } else {
                    (s.attempts - s.failures) as f64 / s.attempts as f64
                };
                (
                    name.clone(),
                    CapabilityStatsSnapshot {
                        attempts: s.attempts,
                        failures: s.failures,
                        avg_duration_ms: avg,
                        success_rate,
                    },
                )
            })
            .collect()
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_run_duration_ms, run_duration_p50_ms, run_duration_p95_ms) =
            self.run_duration_statistics();

        MetricsSnapshot {
            tasks: TaskMetrics {
                submitted: self.tasks_submitted.load(Ordering::Relaxed),
                rejected: self.tasks_rejected.load(Ordering::Relaxed),
                processing: self.tasks_processing.load(Ordering::Relaxed),
                completed: self.tasks_completed.load(Ordering::Relaxed),
                failed: self.tasks_failed.load(Ordering::Relaxed),
                duplicate_deliveries_skipped: self.duplicate_deliveries.load(Ordering::Relaxed),
                avg_run_duration_ms,
                run_duration_p50_ms,
                run_duration_p95_ms,
            },
            queue: QueueMetrics {
                jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
                depth: self.queue_depth.load(Ordering::Relaxed),
                max_depth: self.max_queue_depth.load(Ordering::Relaxed),
            },
            steps: StepMetrics {
                attempts: self.step_attempts.load(Ordering::Relaxed),
                retries: self.step_retries.load(Ordering::Relaxed),
                by_capability: self.capability_snapshots(),
            },
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct CapabilityStats {
    attempts: u64,
    failures: u64,
    durations: Vec<u64>, // milliseconds
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tasks: TaskMetrics,
    pub queue: QueueMetrics,
    pub steps: StepMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskMetrics {
    pub submitted: u64,
    pub rejected: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub duplicate_deliveries_skipped: u64,
    pub avg_run_duration_ms: f64,
    pub run_duration_p50_ms: f64,
    pub run_duration_p95_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct QueueMetrics {
    pub jobs_enqueued: u64,
    pub depth: u64,
    pub max_depth: u64,
}

#[derive(Debug, Serialize)]
pub struct StepMetrics {
    pub attempts: u64,
    pub retries: u64,
    pub by_capability: HashMap<String, CapabilityStatsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct CapabilityStatsSnapshot {
    pub attempts: u64,
    pub failures: u64,
    pub avg_duration_ms: f64,
    pub success_rate: f64,
}

fn saturating_decrement(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

fn push_sample(samples: &mut Vec<u64>, duration: Duration) {
    samples.push(duration.as_millis() as u64);
    if samples.len() > MAX_SAMPLES {
        samples.remove(0);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}
