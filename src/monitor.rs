//! Periodic CPU and memory sampler.
//!
//! CPU utilization is the busy share of the delta between two whole-system
//! CPU-time snapshots, across all logical cores. Memory is this process's
//! resident set size. Sampling runs on its own task and never blocks the
//! measured work.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub elapsed_ms: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub average: f64,
    pub peak: f64,
    pub samples: usize,
}

impl MetricSummary {
    /// Zero for an empty series.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sum = 0.0;
        let mut peak = f64::MIN;
        let mut samples = 0usize;
        for v in values {
            sum += v;
            peak = peak.max(v);
            samples += 1;
        }
        if samples == 0 {
            return Self::default();
        }
        Self {
            average: sum / samples as f64,
            peak,
            samples,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub cpu: MetricSummary,
    pub memory: MetricSummary,
}

impl MonitorReport {
    pub fn from_samples(samples: &[ResourceSample]) -> Self {
        Self {
            cpu: MetricSummary::from_values(samples.iter().map(|s| s.cpu_percent)),
            memory: MetricSummary::from_values(samples.iter().map(|s| s.memory_mb)),
        }
    }
}

/// Cumulative jiffies of one logical core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// User plus system time. Nice, interrupt and steal time count toward
    /// the total only.
    fn busy(&self) -> u64 {
        self.user + self.system
    }

    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Per-core lines (`cpu0`, `cpu1`, ...) of `/proc/stat`.
pub fn parse_proc_stat(raw: &str) -> Vec<CpuTimes> {
    raw.lines()
        .filter(|l| l.starts_with("cpu") && l.as_bytes().get(3).is_some_and(u8::is_ascii_digit))
        .map(|l| {
            let f: Vec<u64> = l
                .split_whitespace()
                .skip(1)
                .map(|v| v.parse().unwrap_or(0))
                .collect();
            let at = |i: usize| f.get(i).copied().unwrap_or(0);
            CpuTimes {
                user: at(0),
                nice: at(1),
                system: at(2),
                idle: at(3),
                iowait: at(4),
                irq: at(5),
                softirq: at(6),
                steal: at(7),
            }
        })
        .collect()
}

/// `(Δuser + Δsystem) / Δtotal × 100` summed across cores. Zero when nothing elapsed.
pub fn cpu_utilization(prev: &[CpuTimes], curr: &[CpuTimes]) -> f64 {
    let mut busy = 0u64;
    let mut total = 0u64;
    for (p, c) in prev.iter().zip(curr) {
        busy += c.busy().saturating_sub(p.busy());
        total += c.total().saturating_sub(p.total());
    }
    if total == 0 {
        0.0
    } else {
        (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// `VmRSS` from `/proc/<pid>/status`, in megabytes.
pub fn parse_vm_rss_mb(raw: &str) -> Option<f64> {
    let line = raw.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

fn read_cpu_times() -> Vec<CpuTimes> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(raw) = std::fs::read_to_string("/proc/stat") {
            return parse_proc_stat(&raw);
        }
    }
    Vec::new()
}

fn read_rss_mb() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(raw) = std::fs::read_to_string("/proc/self/status") {
            return parse_vm_rss_mb(&raw).unwrap_or(0.0);
        }
    }
    0.0
}

pub struct ResourceMonitor {
    interval: Duration,
    samples: Arc<Mutex<Vec<ResourceSample>>>,
    task: Option<JoinHandle<()>>,
}

impl ResourceMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            samples: Arc::new(Mutex::new(Vec::new())),
            task: None,
        }
    }

    /// Clears previous samples and begins sampling. Must be called from
    /// within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        self.samples.lock().clear();

        let samples = Arc::clone(&self.samples);
        let period = self.interval;
        self.task = Some(tokio::spawn(async move {
            let started = Instant::now();
            let mut prev = read_cpu_times();
            let mut ticker = tokio::time::interval_at(started + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let curr = read_cpu_times();
                let sample = ResourceSample {
                    elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                    cpu_percent: cpu_utilization(&prev, &curr),
                    memory_mb: read_rss_mb(),
                };
                prev = curr;
                samples.lock().push(sample);
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn samples(&self) -> Vec<ResourceSample> {
        self.samples.lock().clone()
    }

    pub fn results(&self) -> MonitorReport {
        MonitorReport::from_samples(&self.samples.lock())
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Host description printed in benchmark headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub cpu_model: String,
    pub logical_cores: usize,
    pub total_memory_gb: f64,
    pub free_memory_gb: f64,
    pub platform: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let logical_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let (cpu_model, total_memory_gb, free_memory_gb) = host_details();
        Self {
            cpu_model,
            logical_cores,
            total_memory_gb,
            free_memory_gb,
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

fn host_details() -> (String, f64, f64) {
    let mut model = "unknown".to_string();
    let mut total = 0.0;
    let mut free = 0.0;
    #[cfg(target_os = "linux")]
    {
        if let Ok(raw) = std::fs::read_to_string("/proc/cpuinfo") {
            if let Some(name) = raw
                .lines()
                .find(|l| l.starts_with("model name"))
                .and_then(|l| l.split_once(':'))
            {
                model = name.1.trim().to_string();
            }
        }
        if let Ok(raw) = std::fs::read_to_string("/proc/meminfo") {
            let kb = |key: &str| -> f64 {
                raw.lines()
                    .find(|l| l.starts_with(key))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0)
            };
            total = kb("MemTotal:") / 1024.0 / 1024.0;
            free = kb("MemAvailable:") / 1024.0 / 1024.0;
        }
    }
    (model, total, free)
}
